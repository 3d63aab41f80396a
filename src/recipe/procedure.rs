// src/recipe/procedure.rs

//! Build procedures
//!
//! The build step of a recipe is a [`BuildProcedure`]. Manifest recipes get
//! one from a strategy table keyed by [`BuildSystem`]; recipes defined in
//! code may supply any implementation.

use super::Recipe;
use super::format::{BuildSection, BuildSystem};
use crate::context::{Architecture, BuildContext};
use crate::environment::BuildEnv;
use crate::error::{Error, Result};
use crate::process::{ToolOutput, ToolRunner};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything a build procedure gets to work with
pub struct BuildJob<'a> {
    pub recipe: &'a Recipe,
    pub arch: &'a Architecture,
    pub context: &'a BuildContext,
    pub env: &'a BuildEnv,
    /// Extracted and patched source tree
    pub build_dir: &'a Path,
    pub runner: &'a ToolRunner,
    /// Parallel make jobs
    pub jobs: usize,
}

impl BuildJob<'_> {
    /// Substitute build variables in a template
    ///
    /// Recognised: `{name}`, `{version}`, `{version_major}`, `{arch}`,
    /// `{command_prefix}`, `{target}`, `{ndk_api}`, `{android_api}`,
    /// `{ndk_dir}`, `{build_dir}`, `{libs_dir}`, `{jobs}`.
    pub fn substitute(&self, template: &str) -> String {
        self.recipe
            .substitute(template)
            .replace("{arch}", &self.arch.name)
            .replace("{command_prefix}", self.arch.command_prefix())
            .replace("{target}", &self.arch.target())
            .replace("{ndk_api}", &self.arch.ndk_api.to_string())
            .replace("{android_api}", &self.context.android_api().to_string())
            .replace("{ndk_dir}", &self.arch.toolchain().ndk_dir.display().to_string())
            .replace("{build_dir}", &self.build_dir.display().to_string())
            .replace("{libs_dir}", &self.context.libs_dir(self.arch).display().to_string())
            .replace("{jobs}", &self.jobs.to_string())
    }

    /// Run a tool with the composed environment
    pub fn run<S: AsRef<str>>(&self, program: &str, args: &[S], cwd: &Path) -> Result<ToolOutput> {
        Ok(self.runner.run(program, args, cwd, self.env.vars())?)
    }

    /// Directory to build in
    pub fn work_dir(&self, subdir: Option<&str>) -> PathBuf {
        match subdir {
            Some(dir) => self.build_dir.join(self.substitute(dir)),
            None => self.build_dir.to_path_buf(),
        }
    }

    /// Declared artifacts that exist in the build tree
    pub fn declared_artifacts(&self) -> Vec<PathBuf> {
        self.recipe
            .artifacts
            .keys()
            .filter_map(|file| self.recipe.artifact_path(self.build_dir, file))
            .filter(|path| path.is_file())
            .collect()
    }
}

/// A recipe's build step
pub trait BuildProcedure: Send + Sync {
    /// Build the recipe and return the artifact paths it produced
    fn build(&self, job: &BuildJob<'_>) -> Result<Vec<PathBuf>>;

    /// Short name for logs
    fn family(&self) -> &'static str {
        "custom"
    }
}

/// Nothing to build; for marker recipes and prebuilt sources
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBuild;

impl BuildProcedure for NoBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<Vec<PathBuf>> {
        Ok(job.declared_artifacts())
    }

    fn family(&self) -> &'static str {
        "none"
    }
}

/// `./configure --host=<prefix>` followed by make
#[derive(Debug, Clone, Default)]
pub struct ConfigureMake {
    pub args: Vec<String>,
    pub make_args: Vec<String>,
    pub subdir: Option<String>,
}

impl BuildProcedure for ConfigureMake {
    fn build(&self, job: &BuildJob<'_>) -> Result<Vec<PathBuf>> {
        let dir = job.work_dir(self.subdir.as_deref());

        if !dir.join("configure").exists() && dir.join("configure.ac").exists() {
            job.run("autoreconf", &["-fi"], &dir)?;
        }

        let mut args = vec![
            format!("--host={}", job.arch.command_prefix()),
            format!("--prefix={}", dir.join("install").display()),
        ];
        args.extend(self.args.iter().map(|a| job.substitute(a)));
        job.run("./configure", &args, &dir)?;

        run_make(job, &self.make_args, &dir)?;
        Ok(job.declared_artifacts())
    }

    fn family(&self) -> &'static str {
        "configure"
    }
}

/// CMake with the NDK toolchain file
#[derive(Debug, Clone, Default)]
pub struct CMakeBuild {
    pub args: Vec<String>,
    pub subdir: Option<String>,
}

impl BuildProcedure for CMakeBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<Vec<PathBuf>> {
        let dir = job.work_dir(self.subdir.as_deref());
        let toolchain_file = job.arch.toolchain().cmake_toolchain_file();

        let mut args = vec![
            "-S".to_string(),
            ".".to_string(),
            "-B".to_string(),
            "build".to_string(),
            format!("-DCMAKE_TOOLCHAIN_FILE={}", toolchain_file.display()),
            format!("-DANDROID_ABI={}", job.arch.name),
            format!("-DANDROID_PLATFORM=android-{}", job.arch.ndk_api),
            "-DCMAKE_BUILD_TYPE=Release".to_string(),
        ];
        args.extend(self.args.iter().map(|a| job.substitute(a)));
        job.run("cmake", &args, &dir)?;

        let jobs = job.jobs.to_string();
        job.run("cmake", &["--build", "build", "-j", jobs.as_str()], &dir)?;
        Ok(job.declared_artifacts())
    }

    fn family(&self) -> &'static str {
        "cmake"
    }
}

/// Plain make
#[derive(Debug, Clone, Default)]
pub struct MakeBuild {
    pub args: Vec<String>,
    pub subdir: Option<String>,
}

impl BuildProcedure for MakeBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<Vec<PathBuf>> {
        let dir = job.work_dir(self.subdir.as_deref());
        run_make(job, &self.args, &dir)?;
        Ok(job.declared_artifacts())
    }

    fn family(&self) -> &'static str {
        "make"
    }
}

/// A shell script run with `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ScriptBuild {
    pub script: String,
    pub subdir: Option<String>,
}

impl BuildProcedure for ScriptBuild {
    fn build(&self, job: &BuildJob<'_>) -> Result<Vec<PathBuf>> {
        let dir = job.work_dir(self.subdir.as_deref());
        let script = job.substitute(&self.script);
        job.run("sh", &["-e", "-c", script.as_str()], &dir)?;
        Ok(job.declared_artifacts())
    }

    fn family(&self) -> &'static str {
        "script"
    }
}

fn run_make(job: &BuildJob<'_>, extra: &[String], dir: &Path) -> Result<()> {
    let mut args = vec![format!("-j{}", job.jobs)];
    args.extend(extra.iter().map(|a| job.substitute(a)));
    job.run("make", &args, dir)?;
    Ok(())
}

/// Pick the procedure for a manifest's `[build]` section
pub fn from_section(section: &BuildSection) -> Result<Arc<dyn BuildProcedure>> {
    let subdir = section.subdir.clone();
    let procedure: Arc<dyn BuildProcedure> = match section.system {
        BuildSystem::Configure => Arc::new(ConfigureMake {
            args: section.args.clone(),
            make_args: section.make_args.clone(),
            subdir,
        }),
        BuildSystem::Cmake => Arc::new(CMakeBuild {
            args: section.args.clone(),
            subdir,
        }),
        BuildSystem::Make => Arc::new(MakeBuild {
            args: section.args.clone(),
            subdir,
        }),
        BuildSystem::Script => {
            let script = section.script.clone().ok_or_else(|| {
                Error::ParseError("build system 'script' requires a script".to_string())
            })?;
            Arc::new(ScriptBuild { script, subdir })
        }
        BuildSystem::None => Arc::new(NoBuild),
    };
    Ok(procedure)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{BuildConfig, HostPlatform};
    use crate::recipe::RecipeRegistry;
    use std::time::Duration;

    fn context() -> BuildContext {
        let config = BuildConfig::new()
            .with_archs(["armeabi-v7a"])
            .with_ndk("/ndk", "28c")
            .with_ndk_api(21)
            .with_android_api(33)
            .with_storage_dir("/st");
        let registry = RecipeRegistry::new();
        BuildContext::with_host(&config, registry, HostPlatform::Linux).unwrap()
    }

    #[test]
    fn test_substitute() {
        let ctx = context();
        let recipe = Recipe::new("openssl", "3.3.1");
        let env = BuildEnv::new();
        let runner = ToolRunner::new(Duration::from_secs(1), false);
        let job = BuildJob {
            recipe: &recipe,
            arch: &ctx.archs()[0],
            context: &ctx,
            env: &env,
            build_dir: Path::new("/b/openssl"),
            runner: &runner,
            jobs: 6,
        };
        assert_eq!(
            job.substitute("{name}-{version} {arch} {command_prefix} {target} -j{jobs}"),
            "openssl-3.3.1 armeabi-v7a arm-linux-androideabi armv7a-linux-androideabi21 -j6"
        );
        assert_eq!(
            job.substitute("-D__ANDROID_API__={ndk_api} api{android_api} {build_dir}"),
            "-D__ANDROID_API__=21 api33 /b/openssl"
        );
        assert_eq!(job.work_dir(Some("src-{version}")), PathBuf::from("/b/openssl/src-3.3.1"));
    }

    #[test]
    fn test_strategy_table() {
        let section = |system| BuildSection {
            system,
            script: Some("true".to_string()),
            ..BuildSection::default()
        };
        assert_eq!(from_section(&section(BuildSystem::Configure)).unwrap().family(), "configure");
        assert_eq!(from_section(&section(BuildSystem::Cmake)).unwrap().family(), "cmake");
        assert_eq!(from_section(&section(BuildSystem::Make)).unwrap().family(), "make");
        assert_eq!(from_section(&section(BuildSystem::Script)).unwrap().family(), "script");
        assert_eq!(from_section(&section(BuildSystem::None)).unwrap().family(), "none");

        let missing = BuildSection {
            system: BuildSystem::Script,
            ..BuildSection::default()
        };
        assert!(from_section(&missing).is_err());
    }
}
