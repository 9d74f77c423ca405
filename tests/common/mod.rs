// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use formulary::fetch::HttpTransport;
use formulary::hash::hash_bytes;
use formulary::resolver::DirectoryRegistry;
use formulary::{Checksum, Config, Installer, StateObserver};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

/// Configure script that insists on the accepted license marker
pub const CONFIGURE_NEEDS_LICENSE: &str = r#"#!/bin/sh
[ -f .license.accepted ] || { echo "license not accepted" >&2; exit 1; }
echo "$@" > config.args
"#;

/// Configure script that only records its arguments
pub const CONFIGURE: &str = "#!/bin/sh\necho \"$@\" > config.args\n";

pub const BUILD: &str = "#!/bin/sh\necho built > build.out\necho \"$MAKEFLAGS\" > makeflags\n";

pub const BUILD_FAILS: &str = "#!/bin/sh\necho \"error: undefined reference\" >&2\nexit 2\n";

/// Install script: `install.sh <prefix> <name>`
pub const INSTALL: &str = r#"#!/bin/sh
mkdir -p "$1/lib"
cp build.out "$1/lib/$2.so"
"#;

pub const TEST_PASSES: &str = "#!/bin/sh\n[ -f build.out ] && echo \"100% tests passed\"\n";

pub const TEST_FAILS: &str = "#!/bin/sh\necho \"1 of 4 tests failed\"\nexit 1\n";

/// A gzipped source tarball with every file under `<top>/`
pub fn source_tarball(top: &str, files: &[(&str, &str)]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{}/{}", top, path), content.as_bytes())
            .unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Standard source tree: configure, build, install and test scripts
pub fn standard_sources(configure: &str, build: &str, test: &str) -> Vec<(&'static str, String)> {
    vec![
        ("configure.sh", configure.to_string()),
        ("build.sh", build.to_string()),
        ("install.sh", INSTALL.to_string()),
        ("test.sh", test.to_string()),
    ]
}

/// A published source archive
pub struct Published {
    pub url: Url,
    pub checksum: Checksum,
    pub path: PathBuf,
}

/// Scratch area holding a mirror, a registry, a prefix and a cache
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for sub in ["mirror", "recipes", "prefix", "cache", "build"] {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        Self { dir }
    }

    pub fn path(&self, sub: &str) -> PathBuf {
        self.dir.path().join(sub)
    }

    pub fn prefix(&self) -> PathBuf {
        self.path("prefix")
    }

    pub fn registry_dir(&self) -> PathBuf {
        self.path("recipes")
    }

    /// Put `<name>-<version>.tar.gz` on the mirror
    pub fn publish(&self, name: &str, version: &str, files: &[(&str, String)]) -> Published {
        let top = format!("{}-{}", name, version);
        let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (*p, c.as_str())).collect();
        let bytes = source_tarball(&top, &refs);
        let path = self.path("mirror").join(format!("{}.tar.gz", top));
        fs::write(&path, &bytes).unwrap();
        Published {
            url: Url::from_file_path(&path).unwrap(),
            checksum: hash_bytes(&bytes),
            path,
        }
    }

    /// Write a recipe into the registry directory
    pub fn add_recipe(&self, name: &str, toml: &str) -> PathBuf {
        let path = self.registry_dir().join(format!("{}.toml", name));
        fs::write(&path, toml).unwrap();
        path
    }

    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.prefix = self.prefix();
        config.cache_dir = self.path("cache");
        config.build_root = self.path("build");
        config.registry = Some(self.registry_dir());
        config.toolchain = Some("/opt/qt/bin/qmake".to_string());
        config.jobs = 3;
        config.fetch.base_delay_ms = 0;
        config
    }

    pub fn installer(&self, observer: Arc<dyn StateObserver>) -> Installer {
        self.installer_with(self.config(), observer)
    }

    pub fn installer_with(&self, config: Config, observer: Arc<dyn StateObserver>) -> Installer {
        let registry = Arc::new(DirectoryRegistry::new(self.registry_dir()));
        Installer::new(config, Arc::new(HttpTransport::new().unwrap()), registry)
            .with_observer(observer)
    }

    pub fn receipt_path(&self, name: &str) -> PathBuf {
        self.prefix()
            .join(".formulary")
            .join("receipts")
            .join(format!("{}.json", name))
    }
}

/// Recipe TOML using the standard scripts
pub fn recipe_toml(
    name: &str,
    published: &Published,
    depends_on: &[&str],
    extra: &str,
    with_test: bool,
) -> String {
    let deps = depends_on
        .iter()
        .map(|d| format!("\"{}\"", d))
        .collect::<Vec<_>>()
        .join(", ");
    let test = if with_test {
        "\n[test]\ncommand = [\"sh\", \"test.sh\"]\n"
    } else {
        ""
    };
    format!(
        r#"[package]
name = "{name}"
desc = "Test package {name}"
homepage = "https://example.com/{name}"
depends_on = [{deps}]

[source]
url = "{url}"
sha256 = "{sha}"
{extra}
[[install]]
kind = "configure"
command = ["sh", "configure.sh", "-shared", "-release", "-qmake", "%(toolchain)s", "-prefix", "%(prefix)s"]

[[install]]
kind = "build"
command = ["sh", "build.sh"]

[[install]]
kind = "install"
command = ["sh", "install.sh", "%(prefix)s", "%(name)s"]
{test}"#,
        name = name,
        deps = deps,
        url = published.url,
        sha = published.checksum,
        extra = extra,
        test = test,
    )
}

pub fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap()
}
