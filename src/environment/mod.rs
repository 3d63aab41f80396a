// src/environment/mod.rs

//! Compiler and linker environment composition
//!
//! The environment a recipe builds with is layered:
//!
//! 1. the base environment of the architecture (compilers, binutils, flags,
//!    PATH and NDK variables);
//! 2. the exported flags of the recipe's direct dependencies, in the order
//!    they were chosen;
//! 3. the exported flags of the remaining transitive dependencies,
//!    breadth-first;
//! 4. the recipe's own additions.
//!
//! Every layer appends to what is already there. Nothing is overwritten and
//! nothing is de-duplicated, so a flag that two dependencies export shows up
//! twice. Only dependencies that are already built for the architecture
//! contribute.
//!
//! Composition reads nothing but its inputs, so the same inputs give a
//! byte-identical environment and [`BuildEnv::fingerprint`].

use crate::context::{Architecture, BuildContext};
use crate::recipe::{BuildOrder, Recipe};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// A composed build environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Set a variable that is not yet present
    ///
    /// Used only while building the base layer.
    fn set(&mut self, key: &str, value: impl Into<String>) {
        self.vars.entry(key.to_string()).or_insert_with(|| value.into());
    }

    /// Append `value` to `key`, separated by a space
    pub fn append(&mut self, key: &str, value: &str) {
        match self.vars.get_mut(key) {
            Some(existing) if !existing.is_empty() => {
                existing.push(' ');
                existing.push_str(value);
            }
            Some(existing) => existing.push_str(value),
            None => {
                self.vars.insert(key.to_string(), value.to_string());
            }
        }
    }

    /// SHA-256 over the sorted variables
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        for (key, value) in &self.vars {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }
}

/// The base environment for an architecture
pub fn base_environment(arch: &Architecture, ctx: &BuildContext) -> BuildEnv {
    let toolchain = arch.toolchain();
    let tool = |name: &str| toolchain.tool(name).display().to_string();
    let cc = arch.cc().display().to_string();
    let mut env = BuildEnv::new();

    let mut cflags = vec![
        "-DANDROID".to_string(),
        format!("-D__ANDROID_API__={}", arch.ndk_api),
        "-fomit-frame-pointer".to_string(),
    ];
    cflags.extend(arch.cflags());
    let cflags = cflags.join(" ");

    env.set("CC", cc.clone());
    env.set("CXX", arch.cxx().display().to_string());
    env.set("AR", tool("llvm-ar"));
    env.set("RANLIB", tool("llvm-ranlib"));
    env.set("STRIP", format!("{} --strip-unneeded", tool("llvm-strip")));
    env.set("LD", tool("ld"));
    env.set("NM", tool("llvm-nm"));
    env.set("READELF", tool("llvm-readelf"));
    env.set("LDSHARED", format!("{cc} -pthread -shared"));
    env.set("CFLAGS", cflags.clone());
    env.set("CXXFLAGS", cflags);
    env.set("LDFLAGS", format!("-L{}", ctx.libs_dir(arch).display()));
    env.set("LIBS", "");

    let host_path = ctx.host_path();
    if host_path.is_empty() {
        env.set("PATH", toolchain.bin_dir().display().to_string());
    } else {
        env.set("PATH", format!("{}:{}", toolchain.bin_dir().display(), host_path));
    }

    let ndk_dir = toolchain.ndk_dir.display().to_string();
    env.set("ANDROID_NDK_HOME", ndk_dir.clone());
    env.set("ANDROID_NDK_ROOT", ndk_dir);
    env.set("ANDROID_API", ctx.android_api().to_string());
    env.set("NDK_API", format!("android-{}", arch.ndk_api));
    env.set("ARCH", arch.name.clone());
    env.set("TOOLCHAIN_PREFIX", arch.command_prefix());
    env
}

/// Derives build environments from a resolved build order
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentComposer<'a> {
    ctx: &'a BuildContext,
    order: &'a BuildOrder,
}

impl<'a> EnvironmentComposer<'a> {
    pub fn new(ctx: &'a BuildContext, order: &'a BuildOrder) -> Self {
        Self { ctx, order }
    }

    /// Compose the environment for `recipe` on `arch`
    ///
    /// `built` names the recipes already completed for this architecture;
    /// dependencies outside it contribute nothing.
    pub fn compose(&self, recipe: &Recipe, arch: &Architecture, built: &HashSet<String>) -> BuildEnv {
        let mut env = base_environment(arch, self.ctx);

        let direct = self.order.dependencies(&recipe.name).iter();
        let transitive = self.order.transitive_dependencies(&recipe.name);
        for dep in direct.chain(transitive.iter()) {
            if !built.contains(dep) {
                continue;
            }
            if let Some(dep_recipe) = self.ctx.registry().get(dep) {
                self.apply_exports(&mut env, dep_recipe, arch);
            }
        }

        for (key, value) in &recipe.env {
            let value = self.expand(value, arch);
            env.append(key, &value);
        }
        env
    }

    fn apply_exports(&self, env: &mut BuildEnv, dep: &Recipe, arch: &Architecture) {
        let build_dir = self.ctx.recipe_build_dir(&dep.name, arch);
        for dir in &dep.exports.include_dirs {
            let flag = format!("-I{}", export_path(&build_dir, dir).display());
            env.append("CFLAGS", &flag);
            env.append("CXXFLAGS", &flag);
        }
        for dir in &dep.exports.lib_dirs {
            env.append("LDFLAGS", &format!("-L{}", export_path(&build_dir, dir).display()));
        }
        for lib in &dep.exports.link_libs {
            env.append("LIBS", &format!("-l{lib}"));
        }
    }

    /// Expand `{build_dir:<recipe>}` and `{libs_dir}` in recipe-local values
    fn expand(&self, value: &str, arch: &Architecture) -> String {
        let mut value = value.replace("{libs_dir}", &self.ctx.libs_dir(arch).display().to_string());
        while let Some(start) = value.find("{build_dir:") {
            let Some(len) = value[start..].find('}') else {
                break;
            };
            let name = &value[start + "{build_dir:".len()..start + len];
            let dir = self.ctx.recipe_build_dir(name, arch).display().to_string();
            value.replace_range(start..start + len + 1, &dir);
        }
        value
    }
}

fn export_path(build_dir: &Path, dir: &str) -> PathBuf {
    match dir {
        "" | "." => build_dir.to_path_buf(),
        dir if Path::new(dir).is_absolute() => PathBuf::from(dir),
        dir => build_dir.join(dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BuildConfig, HostPlatform};
    use crate::recipe::{DependencyTerm as T, Exports, RecipeRegistry};

    fn exports(include: &[&str], lib: &[&str], link: &[&str]) -> Exports {
        Exports {
            include_dirs: include.iter().map(|s| s.to_string()).collect(),
            lib_dirs: lib.iter().map(|s| s.to_string()).collect(),
            link_libs: link.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn context(recipes: Vec<Recipe>, requested: &[&str]) -> BuildContext {
        let config = BuildConfig::new()
            .with_archs(["arm64-v8a"])
            .with_ndk("/ndk", "28c")
            .with_storage_dir("/st")
            .with_dist_name("demo");
        let registry: RecipeRegistry = recipes.into_iter().collect();
        let mut ctx = BuildContext::with_host(&config, registry, HostPlatform::Linux).unwrap();
        ctx.set_host_path("/usr/bin:/bin");
        ctx.resolve_requested(requested).unwrap();
        ctx
    }

    fn built(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_base_environment() {
        let ctx = context(vec![Recipe::new("sqlite3", "3.50.4")], &["sqlite3"]);
        let arch = &ctx.archs()[0];
        let env = base_environment(arch, &ctx);

        let bin = "/ndk/toolchains/llvm/prebuilt/linux-x86_64/bin";
        assert_eq!(env.get("CC").unwrap(), format!("{bin}/aarch64-linux-android24-clang"));
        assert_eq!(env.get("AR").unwrap(), format!("{bin}/llvm-ar"));
        assert_eq!(env.get("PATH").unwrap(), format!("{bin}:/usr/bin:/bin"));
        assert_eq!(
            env.get("LDFLAGS").unwrap(),
            "-L/st/build/libs_collections/demo/arm64-v8a"
        );
        assert_eq!(env.get("LIBS").unwrap(), "");
        assert!(env.get("CFLAGS").unwrap().contains("-D__ANDROID_API__=24"));
        assert!(env.get("CFLAGS").unwrap().contains("-march=armv8-a"));
        assert_eq!(env.get("TOOLCHAIN_PREFIX").unwrap(), "aarch64-linux-android");
    }

    #[test]
    fn test_apsw_gets_sqlite3_flags() {
        let ctx = context(
            vec![
                Recipe::new("sqlite3", "3.50.4").with_exports(exports(&["."], &["."], &["sqlite3"])),
                Recipe::new("apsw", "3.50.4.0").with_depends([T::single("sqlite3")]),
            ],
            &["apsw"],
        );
        let order = ctx.build_order().unwrap();
        let arch = &ctx.archs()[0];
        let apsw = ctx.recipe("apsw").unwrap();
        let composer = EnvironmentComposer::new(&ctx, order);

        let env = composer.compose(apsw, arch, &built(&["sqlite3"]));
        let sqlite_dir = "/st/build/other_builds/sqlite3/arm64-v8a/sqlite3";
        assert!(env.get("CFLAGS").unwrap().ends_with(&format!(" -I{sqlite_dir}")));
        assert!(env.get("CXXFLAGS").unwrap().ends_with(&format!(" -I{sqlite_dir}")));
        assert!(env.get("LDFLAGS").unwrap().ends_with(&format!(" -L{sqlite_dir}")));
        assert_eq!(env.get("LIBS").unwrap(), "-lsqlite3");

        // sqlite3 not built yet: nothing from it
        let env = composer.compose(apsw, arch, &built(&[]));
        assert!(!env.get("CFLAGS").unwrap().contains("sqlite3"));
        assert_eq!(env.get("LIBS").unwrap(), "");
    }

    #[test]
    fn test_direct_then_transitive_then_local() {
        let ctx = context(
            vec![
                Recipe::new("app", "1")
                    .with_depends([T::single("b"), T::single("a")])
                    .with_env("LIBS", "-lm")
                    .with_env("CFLAGS", "-I{build_dir:c}/extra"),
                Recipe::new("a", "1").with_exports(exports(&[], &[], &["a"])),
                Recipe::new("b", "1")
                    .with_depends([T::single("c")])
                    .with_exports(exports(&[], &[], &["b"])),
                Recipe::new("c", "1").with_exports(exports(&[], &[], &["c"])),
            ],
            &["app"],
        );
        let order = ctx.build_order().unwrap();
        let arch = &ctx.archs()[0];
        let env = EnvironmentComposer::new(&ctx, order).compose(
            ctx.recipe("app").unwrap(),
            arch,
            &built(&["a", "b", "c"]),
        );

        assert_eq!(env.get("LIBS").unwrap(), "-lb -la -lc -lm");
        assert!(
            env.get("CFLAGS")
                .unwrap()
                .ends_with(" -I/st/build/other_builds/c/arm64-v8a/c/extra")
        );
    }

    #[test]
    fn test_values_are_not_deduplicated() {
        let ctx = context(
            vec![
                Recipe::new("app", "1").with_depends([T::single("a"), T::single("b")]),
                Recipe::new("a", "1").with_exports(exports(&["/opt/include"], &[], &["z"])),
                Recipe::new("b", "1").with_exports(exports(&["/opt/include"], &[], &["z"])),
            ],
            &["app"],
        );
        let order = ctx.build_order().unwrap();
        let env = EnvironmentComposer::new(&ctx, order).compose(
            ctx.recipe("app").unwrap(),
            &ctx.archs()[0],
            &built(&["a", "b"]),
        );
        assert_eq!(env.get("LIBS").unwrap(), "-lz -lz");
        assert_eq!(env.get("CFLAGS").unwrap().matches("-I/opt/include").count(), 2);
    }

    #[test]
    fn test_composition_is_pure() {
        let make = || {
            context(
                vec![
                    Recipe::new("sqlite3", "3.50.4").with_exports(exports(&["."], &["."], &["sqlite3"])),
                    Recipe::new("apsw", "3.50.4.0").with_depends([T::single("sqlite3")]),
                ],
                &["apsw"],
            )
        };
        let ctx1 = make();
        let ctx2 = make();
        let compose = |ctx: &BuildContext| {
            EnvironmentComposer::new(ctx, ctx.build_order().unwrap()).compose(
                ctx.recipe("apsw").unwrap(),
                &ctx.archs()[0],
                &built(&["sqlite3"]),
            )
        };
        let env1 = compose(&ctx1);
        let env2 = compose(&ctx2);
        assert_eq!(env1, env2);
        assert_eq!(env1.fingerprint(), env2.fingerprint());
        assert_eq!(env1.fingerprint(), compose(&ctx1).fingerprint());

        let bare = EnvironmentComposer::new(&ctx1, ctx1.build_order().unwrap()).compose(
            ctx1.recipe("apsw").unwrap(),
            &ctx1.archs()[0],
            &built(&[]),
        );
        assert_ne!(bare.fingerprint(), env1.fingerprint());
    }

    #[test]
    fn test_append() {
        let mut env = BuildEnv::new();
        env.append("LIBS", "-la");
        env.append("LIBS", "-lb");
        assert_eq!(env.get("LIBS"), Some("-la -lb"));
    }
}
