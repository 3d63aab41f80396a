// src/predicate/mod.rs

//! Patch predicates
//!
//! A predicate decides whether a guarded patch applies to a recipe being
//! built for an architecture. Predicates are plain values: base checks over
//! the architecture, the recipe and the [`BuildContext`], the `All`/`Any`
//! combinators, and a [`CustomCheck`] escape hatch holding a function value.
//! Evaluation has no side effects, so the same inputs always give the same
//! answer.
//!
//! Recipe manifests spell predicates as externally tagged TOML tables:
//!
//! ```toml
//! [[patches]]
//! file = "genericndkbuild_jnienv_getter.patch"
//! when = { will_build = "genericndkbuild" }
//!
//! [[patches]]
//! file = "fix-arm64-asm.patch"
//! when = { all = [{ arch = "arm64-v8a" }, { api = { op = ">=", level = 24 } }] }
//! ```

use crate::context::{Architecture, BuildContext, HostPlatform};
use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::version::RecipeVersion;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// Comparison operator for API level checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Comparison {
    #[serde(rename = "=", alias = "==")]
    Eq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
}

impl Comparison {
    fn holds(self, actual: u32, expected: u32) -> bool {
        match self {
            Self::Eq => actual == expected,
            Self::Gt => actual > expected,
            Self::Gte => actual >= expected,
            Self::Lt => actual < expected,
            Self::Lte => actual <= expected,
        }
    }
}

type CheckFn = dyn Fn(&Architecture, &Recipe, &BuildContext) -> bool + Send + Sync;

/// A named, caller-supplied check
#[derive(Clone)]
pub struct CustomCheck {
    name: String,
    check: Arc<CheckFn>,
}

impl fmt::Debug for CustomCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomCheck").field("name", &self.name).finish()
    }
}

/// A composable patch guard
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Host platform family, compared case-insensitively
    Platform(String),
    /// Target architecture (ABI name)
    Arch(String),
    /// Target Android API level comparison
    Api { op: Comparison, level: u32 },
    /// NDK version equality ("28c", "r28c")
    Ndk(String),
    /// Recipe version strictly greater than
    VersionGt(String),
    /// Recipe version strictly less than
    VersionLt(String),
    /// Recipe version begins with these dot-separated segments
    VersionStartsWith(String),
    /// The named recipe is part of the resolved build order
    WillBuild(String),
    /// True iff every child is true (true when empty)
    All(Vec<Predicate>),
    /// True iff at least one child is true (false when empty)
    Any(Vec<Predicate>),
    #[serde(skip)]
    Custom(CustomCheck),
}

impl Predicate {
    /// Wrap a function value as a predicate
    pub fn custom<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&Architecture, &Recipe, &BuildContext) -> bool + Send + Sync + 'static,
    {
        Self::Custom(CustomCheck {
            name: name.into(),
            check: Arc::new(check),
        })
    }

    /// Evaluate the predicate for `recipe` being built for `arch`
    ///
    /// Fails only on configuration errors, such as a platform check on a
    /// host platform this tool does not support.
    pub fn evaluate(&self, arch: &Architecture, recipe: &Recipe, ctx: &BuildContext) -> Result<bool> {
        match self {
            Self::Platform(name) => match ctx.host() {
                HostPlatform::Unsupported(host) => Err(Error::UnsupportedHost {
                    requested: name.clone(),
                    host: host.clone(),
                }),
                host => Ok(host.matches(name)),
            },
            Self::Arch(name) => Ok(arch.name == *name),
            Self::Api { op, level } => Ok(op.holds(ctx.android_api(), *level)),
            Self::Ndk(version) => Ok(normalize_ndk(&ctx.toolchain().ndk_version)
                .eq_ignore_ascii_case(normalize_ndk(version))),
            Self::VersionGt(version) => Ok(recipe.version > RecipeVersion::parse(version)),
            Self::VersionLt(version) => Ok(recipe.version < RecipeVersion::parse(version)),
            Self::VersionStartsWith(prefix) => Ok(recipe.version.starts_with(prefix)),
            Self::WillBuild(name) => Ok(ctx.will_build(name)),
            Self::All(children) => {
                for child in children {
                    if !child.evaluate(arch, recipe, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Self::Any(children) => {
                for child in children {
                    if child.evaluate(arch, recipe, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Self::Custom(custom) => Ok((custom.check)(arch, recipe, ctx)),
        }
    }
}

fn normalize_ndk(version: &str) -> &str {
    let version = version.trim();
    version
        .strip_prefix('r')
        .or_else(|| version.strip_prefix('R'))
        .unwrap_or(version)
}

// Constructors named after the checks recipe authors reach for.

pub fn is_platform(name: &str) -> Predicate {
    Predicate::Platform(name.to_string())
}

pub fn is_linux() -> Predicate {
    is_platform("linux")
}

pub fn is_darwin() -> Predicate {
    is_platform("darwin")
}

pub fn is_windows() -> Predicate {
    is_platform("windows")
}

pub fn is_arch(name: &str) -> Predicate {
    Predicate::Arch(name.to_string())
}

pub fn is_api(level: u32) -> Predicate {
    Predicate::Api {
        op: Comparison::Eq,
        level,
    }
}

pub fn is_api_gt(level: u32) -> Predicate {
    Predicate::Api {
        op: Comparison::Gt,
        level,
    }
}

pub fn is_api_gte(level: u32) -> Predicate {
    Predicate::Api {
        op: Comparison::Gte,
        level,
    }
}

pub fn is_api_lt(level: u32) -> Predicate {
    Predicate::Api {
        op: Comparison::Lt,
        level,
    }
}

pub fn is_api_lte(level: u32) -> Predicate {
    Predicate::Api {
        op: Comparison::Lte,
        level,
    }
}

pub fn is_ndk(version: &str) -> Predicate {
    Predicate::Ndk(version.to_string())
}

pub fn is_version_gt(version: &str) -> Predicate {
    Predicate::VersionGt(version.to_string())
}

pub fn is_version_lt(version: &str) -> Predicate {
    Predicate::VersionLt(version.to_string())
}

pub fn version_starts_with(prefix: &str) -> Predicate {
    Predicate::VersionStartsWith(prefix.to_string())
}

pub fn will_build(name: &str) -> Predicate {
    Predicate::WillBuild(name.to_string())
}

pub fn check_all(children: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::All(children.into_iter().collect())
}

pub fn check_any(children: impl IntoIterator<Item = Predicate>) -> Predicate {
    Predicate::Any(children.into_iter().collect())
}
