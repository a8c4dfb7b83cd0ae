//! Test fixtures: throwaway origin repositories for the engine source.
//!
//! The default origin contains a `build.sh`/`install.sh` pair that behaves
//! like a tiny engine build: it "compiles" a wrapper script and installs it
//! under `$PREFIX/bin`, plus heavyweight-looking directories to prune.

use std::fs;
use std::path::Path;

use git2::{Oid, Repository, RepositoryInitOptions, Signature};
use tempfile::TempDir;
use url::Url;

use crate::builder::WrapperSpec;
use crate::util::Config;

pub const BUILD_SH: &str = r#"set -e
echo "building with CC=$CC CXX=$CXX"
mkdir -p out
printf '#!/bin/sh\necho afl-cc "$@"\n' > out/afl-clang-fast
"#;

pub const INSTALL_SH: &str = r#"set -e
mkdir -p "$PREFIX/bin" "$PREFIX/lib/afl"
cp out/afl-clang-fast "$PREFIX/bin/afl-clang-fast"
chmod +x "$PREFIX/bin/afl-clang-fast"
echo runtime > "$PREFIX/lib/afl/afl-compiler-rt.o"
"#;

/// A non-bare repository in a temp dir, cloned over `file://`.
pub struct OriginRepo {
    dir: TempDir,
    repo: Repository,
}

impl OriginRepo {
    /// An origin on branch `main` holding the default build scripts.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(dir.path(), &opts).unwrap();

        let origin = OriginRepo { dir, repo };
        origin.write("build.sh", BUILD_SH);
        origin.write("install.sh", INSTALL_SH);
        origin.write("qemu_mode/README", "qemu support\n");
        origin.write("unicorn_mode/README", "unicorn support\n");
        origin.commit_all("initial");
        origin
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn url(&self) -> String {
        Url::from_file_path(self.dir.path()).unwrap().to_string()
    }

    pub fn head(&self) -> Oid {
        self.repo.head().unwrap().peel_to_commit().unwrap().id()
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    fn commit_all(&self, message: &str) -> Oid {
        let mut index = self.repo.index().unwrap();
        index
            .add_all(["*"].iter(), git2::IndexAddOption::DEFAULT, None)
            .unwrap();
        index.write().unwrap();
        let tree_id = index.write_tree().unwrap();
        let tree = self.repo.find_tree(tree_id).unwrap();
        let sig = Signature::now("fuzzenv", "fuzzenv@example.com").unwrap();

        let parent = self.repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.iter().collect();
        self.repo
            .commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .unwrap()
    }

    /// Commit a file on `main`, moving the branch head.
    pub fn commit_file(&self, rel: &str, contents: &str, message: &str) -> Oid {
        self.write(rel, contents);
        self.commit_all(message)
    }

    /// Create `branch` with one commit that `main` does not contain.
    pub fn commit_on_branch(&self, branch: &str, message: &str) -> Oid {
        let head = self.repo.head().unwrap().peel_to_commit().unwrap();
        let tree = head.tree().unwrap();
        let sig = Signature::now("fuzzenv", "fuzzenv@example.com").unwrap();
        let refname = format!("refs/heads/{}", branch);
        self.repo
            .commit(Some(refname.as_str()), &sig, &sig, message, &tree, &[&head])
            .unwrap()
    }

    pub fn tag(&self, name: &str, target: Oid) {
        let obj = self.repo.find_object(target, None).unwrap();
        self.repo.tag_lightweight(name, &obj, false).unwrap();
    }
}

impl Default for OriginRepo {
    fn default() -> Self {
        OriginRepo::new()
    }
}

/// A config that provisions from `origin` with everything under `root`.
///
/// Build and install run the origin's `sh` scripts; the engine wrappers are
/// `afl-cc` and `afl-c++`, links go to `<root>/bin` and the env file to
/// `<root>/env.sh`.
pub fn config_fixture(origin: &OriginRepo, root: &Path) -> Config {
    let mut config = Config::default();
    config.alternatives.link_dir = Some(root.join("bin"));

    let engine = &mut config.engine;
    engine.repository = origin.url();
    engine.branch = "main".to_string();
    engine.revision = "main".to_string();
    engine.workdir = root.join("src");
    engine.install_root = root.join("opt");
    engine.build_command = vec!["sh".to_string(), "build.sh".to_string()];
    engine.install_command = vec!["sh".to_string(), "install.sh".to_string()];
    engine.jobs = Some(1);
    engine.wrappers = vec![
        WrapperSpec {
            alias: "afl-cc".to_string(),
            binary: "afl-clang-fast".to_string(),
            symlink_to: None,
            priority: 100,
        },
        WrapperSpec {
            alias: "afl-c++".to_string(),
            binary: "afl-clang-fast++".to_string(),
            symlink_to: Some("afl-clang-fast".to_string()),
            priority: 100,
        },
    ];

    config.session.env_file = Some(root.join("env.sh"));
    config
}
