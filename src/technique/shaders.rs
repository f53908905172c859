//! Shader provider boundary
//!
//! Shader payloads are opaque to the graph. A provider hands one out per
//! [`PassKind`]; the pass builder forwards it untouched to pipeline creation.

use std::collections::HashMap;

use crate::backend::types::ShaderModule;
use crate::render_graph::PassKind;

/// Supplies compiled shader payloads for built-in passes
pub trait ShaderProvider {
    fn shader(&self, kind: PassKind) -> Option<ShaderModule>;
}

/// In-memory shader library keyed by pass kind
#[derive(Debug, Clone, Default)]
pub struct ShaderLibrary {
    modules: HashMap<PassKind, ShaderModule>,
}

impl ShaderLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Library with a small named payload for every built-in kind.
    ///
    /// Backends that never compile shaders, like the dummy backend, accept it.
    pub fn placeholder() -> Self {
        let mut library = Self::new();
        for kind in PassKind::BUILT_IN {
            let label = format!("{:?}", kind);
            let bytes = label.as_bytes().to_vec();
            library.insert(kind, ShaderModule::new(label, bytes));
        }
        library
    }

    /// Register or replace the payload for `kind`.
    pub fn insert(&mut self, kind: PassKind, module: ShaderModule) -> Option<ShaderModule> {
        self.modules.insert(kind, module)
    }

    pub fn remove(&mut self, kind: PassKind) -> Option<ShaderModule> {
        self.modules.remove(&kind)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl ShaderProvider for ShaderLibrary {
    fn shader(&self, kind: PassKind) -> Option<ShaderModule> {
        self.modules.get(&kind).cloned()
    }
}
