// tests/end_to_end.rs

//! Full runs from recipe manifests to an assembled distribution.

mod common;

use common::{Fixture, WriteArtifacts, sha256, tarball, test_config, test_context};
use crossbake::bootstrap::{DIST_INFO_FILE, DistInfo};
use crossbake::recipe::load_registry;
use crossbake::recipe::{DependencyTerm as T, Exports};
use crossbake::{
    Assembler, BuildContext, ConsentMode, EnvFlags, HostPlatform, Kitchen, Pipeline,
    PrerequisiteChecker, Recipe,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;

fn skip_checks() -> EnvFlags {
    EnvFlags {
        skip_prerequisites: true,
        ..EnvFlags::default()
    }
}

fn write_manifests(dir: &Path, source: &Path, checksum: &str) {
    let url = url::Url::from_file_path(source).unwrap();
    fs::write(
        dir.join("sqlite3.toml"),
        format!(
            r#"
[package]
name = "sqlite3"
version = "3.50.4"

[source]
url = "{url}"
checksum = "{checksum}"

[artifacts]
"libsqlite3.so" = "out"

[exports]
include_dirs = ["."]
lib_dirs = ["out"]
link_libs = ["sqlite3"]

[build]
system = "script"
script = "mkdir -p out && cp sqlite3.c out/libsqlite3.so"
"#
        ),
    )
    .unwrap();

    fs::write(
        dir.join("apsw.toml"),
        r#"
[package]
name = "apsw"
version = "3.50.4.0"

[dependencies]
depends = ["sqlite3"]

[artifacts]
"apsw.so" = "."

[build]
system = "script"
script = "printf '%s\n%s\n' \"$CFLAGS\" \"$LIBS\" > flags.txt && touch apsw.so"

[environment]
LIBS = "-lm"
"#,
    )
    .unwrap();
}

#[test]
fn test_manifest_build_to_distribution() {
    let fixture = Fixture::new();
    let root = fixture.root();

    let source = root.join("sqlite-3.50.4.tar.gz");
    let data = tarball("sqlite-3.50.4", &[("sqlite3.c", b"/* amalgamation */\n")]);
    fs::write(&source, &data).unwrap();

    let recipes = root.join("recipes");
    fs::create_dir_all(&recipes).unwrap();
    write_manifests(&recipes, &source, &sha256(&data));

    let config = test_config(root, &["arm64-v8a", "x86_64"], &["apsw"]);
    let registry = load_registry(&[recipes]).unwrap();
    let mut ctx = BuildContext::with_host(&config, registry, HostPlatform::Linux).unwrap();

    // Real fetcher (file:// URL) and real script procedure
    let kitchen = Kitchen::new(config.kitchen.clone()).unwrap();
    let checker = PrerequisiteChecker::new(HostPlatform::Linux, ConsentMode::Unattended);
    let assembler = Assembler::default();

    let report = Pipeline::new(&checker, skip_checks(), &kitchen, &assembler)
        .run(&mut ctx)
        .unwrap();
    assert!(report.is_success(), "{:?}", report.kitchen.failures().collect::<Vec<_>>());
    assert_eq!(report.distributions.len(), 2);

    let dist = &ctx.layout().dist_dir;
    for arch in ["arm64-v8a", "x86_64"] {
        assert!(dist.join("libs").join(arch).join("libsqlite3.so").is_file());
        assert!(dist.join("libs").join(arch).join("apsw.so").is_file());
        assert!(dist.join(format!("_python_bundle__{arch}/_python_bundle")).is_dir());
    }

    let arm = ctx.arch("arm64-v8a").unwrap();
    let flags = fs::read_to_string(ctx.recipe_build_dir("apsw", arm).join("flags.txt")).unwrap();
    let sqlite_dir = ctx.recipe_build_dir("sqlite3", arm);
    assert!(flags.contains(&format!("-I{}", sqlite_dir.display())));
    assert!(flags.lines().nth(1).unwrap().ends_with("-lsqlite3 -lm"));

    let info = DistInfo::load(dist).unwrap().unwrap();
    assert_eq!(info.dist_name, "demo");
    assert_eq!(info.recipes, ["sqlite3", "apsw"]);
    assert_eq!(info.archs.len(), 2);
    assert_eq!(info.archs["x86_64"], ["apsw.so", "libsqlite3.so"]);
    assert_eq!(info.ndk_version, "28c");
    assert!(dist.join(DIST_INFO_FILE).is_file());
}

#[test]
fn test_failed_arch_is_not_assembled() {
    let fixture = Fixture::new();
    let failing = WriteArtifacts::failing_on("armeabi-v7a");

    let config = test_config(fixture.root(), &["arm64-v8a", "armeabi-v7a"], &["libffi"]);
    let mut ctx = test_context(
        &config,
        vec![Recipe::new("libffi", "3.4.2")
            .with_artifact("libffi.so", ".libs")
            .with_procedure(Arc::new(failing.clone()))],
    );

    let kitchen = fixture.kitchen(&config);
    let checker = PrerequisiteChecker::new(HostPlatform::Linux, ConsentMode::Unattended);
    let assembler = Assembler::default();
    let report = Pipeline::new(&checker, skip_checks(), &kitchen, &assembler)
        .run(&mut ctx)
        .unwrap();

    assert!(!report.is_success());
    let assembled: Vec<&str> = report.distributions.iter().map(|(a, _)| a.as_str()).collect();
    assert_eq!(assembled, ["arm64-v8a"]);

    let dist = &ctx.layout().dist_dir;
    assert!(dist.join("libs/arm64-v8a/libffi.so").is_file());
    assert!(!dist.join("libs/armeabi-v7a").exists());
    let info = DistInfo::load(dist).unwrap().unwrap();
    assert!(!info.archs.contains_key("armeabi-v7a"));
}

#[test]
fn test_unresolvable_build_touches_nothing() {
    let fixture = Fixture::new();
    let config = test_config(fixture.root(), &["arm64-v8a"], &["pyjnius"]);
    let mut ctx = test_context(
        &config,
        vec![Recipe::new("pyjnius", "1.6.1")
            .with_url("https://example.test/pyjnius.zip")
            .with_depends([T::any_of(["genericndkbuild", "sdl2"])])
            .with_exports(Exports::default())],
    );

    let kitchen = fixture.kitchen(&config);
    let checker = PrerequisiteChecker::new(HostPlatform::Linux, ConsentMode::Unattended);
    let assembler = Assembler::default();
    let err = Pipeline::new(&checker, skip_checks(), &kitchen, &assembler)
        .run(&mut ctx)
        .unwrap_err();

    assert!(matches!(err, crossbake::Error::UnsatisfiableDependency { .. }));
    assert!(fixture.fetcher.calls().is_empty());
    assert!(!ctx.layout().build_dir.exists());
}

#[test]
fn test_missing_ndk_is_a_setup_error() {
    let fixture = Fixture::new();
    let config = test_config(fixture.root(), &["arm64-v8a"], &["sqlite3"]);
    fs::remove_dir_all(fixture.root().join("ndk")).unwrap();
    let mut ctx = test_context(&config, vec![Recipe::new("sqlite3", "3.50.4")]);

    let kitchen = fixture.kitchen(&config);
    let checker = PrerequisiteChecker::new(HostPlatform::Linux, ConsentMode::Unattended);
    let assembler = Assembler::default();
    let pipeline = Pipeline::new(&checker, skip_checks(), &kitchen, &assembler);

    let err = pipeline.run(&mut ctx).unwrap_err();
    assert!(matches!(err, crossbake::Error::ConfigError(_)));
    assert!(ctx.build_order().is_none());

    // Recipes that never touch the compiler can run without the check
    let report = pipeline.with_toolchain_check(false).run(&mut ctx).unwrap();
    assert!(report.is_success());
}
