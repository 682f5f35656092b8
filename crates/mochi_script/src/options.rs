//! Host options

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;

/// How the runtime host loads and configures the managed runtime.
///
/// Paths themselves are passed to [`crate::RuntimeHost::initialize`]; these
/// options only shape how the runtime is brought up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostOptions {
    /// Friendly name of the app domain created at initialization.
    pub app_domain_name: String,
    /// File name of the runtime module inside the runtime directory.
    /// `None` uses the platform name for `coreclr`.
    pub runtime_module: Option<String>,
    /// File extensions (without the dot) that count as loadable assemblies.
    pub assembly_extensions: Vec<String>,
    /// Separator placed between trusted assembly paths.
    pub list_separator: char,
    /// Extra runtime properties, passed after the standard ones.
    pub properties: BTreeMap<String, String>,
}

impl HostOptions {
    /// File name of the runtime module to load.
    pub fn runtime_module_name(&self) -> OsString {
        match &self.runtime_module {
            Some(name) => OsString::from(name),
            None => libloading::library_filename("coreclr"),
        }
    }
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            app_domain_name: "MochiHost".to_string(),
            runtime_module: None,
            assembly_extensions: vec!["dll".to_string(), "exe".to_string()],
            list_separator: ';',
            properties: BTreeMap::new(),
        }
    }
}
