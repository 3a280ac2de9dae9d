//! Bundler plugin protocol.
//!
//! The host bundler drives plugins through three extension points:
//! 1. `options` — adjust the input list before the graph is built
//! 2. `resolve_id` — claim an import specifier and return its module id
//! 3. `load` — produce source text for a claimed module id
//!
//! The types mirror `rolldown_plugin::Plugin` and its hook outputs, so a
//! Rolldown adapter forwards each hook one to one.
//!
//! Hooks are chained. A hook that returns `Ok(None)` declines, and the bundler
//! asks the next plugin. Errors abort the build.

pub mod pages_loader;
pub mod resolver;

use std::borrow::Cow;
use std::future::Future;

use arcstr::ArcStr;
use bitflags::bitflags;

use crate::entries::EntryInput;
use crate::{BuildTarget, PagesError};

bitflags! {
    /// Hooks a plugin wants to be called for.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct HookUsage: u8 {
        const Options = 1 << 0;
        const ResolveId = 1 << 1;
        const Load = 1 << 2;
    }
}

/// Result of a claimed `resolve_id` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookResolveIdOutput {
    pub id: ArcStr,
    /// Never bundle; leave the import in place.
    pub external: bool,
}

/// Result of a claimed `load` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HookLoadOutput {
    pub code: ArcStr,
}

pub type HookResolveIdReturn = Result<Option<HookResolveIdOutput>, PagesError>;
pub type HookLoadReturn = Result<Option<HookLoadOutput>, PagesError>;

/// A plugin as seen by the host bundler.
pub trait Plugin: Send + Sync {
    fn name(&self) -> Cow<'static, str>;

    fn build_target(&self) -> BuildTarget {
        BuildTarget::Both
    }

    fn register_hook_usage(&self) -> HookUsage;

    /// Adjust the bundler input before the build starts.
    fn options(&self, _input: &mut EntryInput) -> Result<(), PagesError> {
        Ok(())
    }

    fn resolve_id(&self, _specifier: &str) -> HookResolveIdReturn {
        Ok(None)
    }

    fn load(&self, id: &str) -> impl Future<Output = HookLoadReturn> + Send;
}
