//! Suite tables per toolchain generation.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, HarnessResult};
use crate::toolchain::ToolchainGeneration;

/// Where a suite's corpus comes from and where it lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteDescriptor {
    /// Target handed to the corpus compiler.
    pub compile_target: String,

    /// Identifier of the IR generator that writes the `.out.ll` files.
    pub generator_id: String,

    /// Cache directory, relative to the configured cache root.
    pub cache_dir: PathBuf,
}

impl SuiteDescriptor {
    fn new(compile_target: &str, generator_id: &str, cache_dir: &str) -> Self {
        Self {
            compile_target: compile_target.to_string(),
            generator_id: generator_id.to_string(),
            cache_dir: PathBuf::from(cache_dir),
        }
    }

    /// A suite outside the registry: just a directory, no corpus metadata.
    pub fn ad_hoc(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            compile_target: String::new(),
            generator_id: String::new(),
            cache_dir: cache_dir.into(),
        }
    }
}

const GENERATOR_PREFIX: &str = "at.pointhi.irbuilder.test.";

/// Immutable suite lookup table of one toolchain generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteRegistry {
    generation: ToolchainGeneration,
    suites: BTreeMap<String, SuiteDescriptor>,
}

impl SuiteRegistry {
    /// The built-in table for `generation`.
    pub fn for_generation(generation: ToolchainGeneration) -> Self {
        // (name, compile target, generator class, cache dir)
        let rows: &[(&str, &str, &str, &str)] = match generation {
            ToolchainGeneration::Llvm32 => &[
                ("sulong", "sulong", "SulongGeneratorSuite", "sulong"),
                ("llvm", "llvm", "LLVMGeneratorSuite", "llvm"),
                ("gcc", "gcc", "GCCGeneratorSuite", "gcc"),
                ("nwcc", "nwcc", "NWCCGeneratorSuite", "nwcc"),
                (
                    "assembly",
                    "assembly",
                    "InlineAssemblyGeneratorSuite",
                    "inlineassemblytests",
                ),
            ],
            ToolchainGeneration::Llvm38 => &[
                ("sulong", "sulong38", "SulongGeneratorSuite", "sulong"),
                ("sulongcpp", "sulongcpp38", "SulongCPPGeneratorSuite", "sulongcpp"),
                ("llvm", "llvm38", "LLVMGeneratorSuite", "llvm"),
                ("gcc", "gcc38", "GCCGeneratorSuite", "gcc"),
                ("nwcc", "nwcc38", "NWCCGeneratorSuite", "nwcc"),
            ],
        };

        let suites = rows
            .iter()
            .map(|(name, target, generator, cache)| {
                (
                    name.to_string(),
                    SuiteDescriptor::new(target, &format!("{GENERATOR_PREFIX}{generator}"), cache),
                )
            })
            .collect();

        Self { generation, suites }
    }

    pub fn generation(&self) -> ToolchainGeneration {
        self.generation
    }

    /// Exact-match lookup.
    pub fn get(&self, name: &str) -> Option<&SuiteDescriptor> {
        self.suites.get(name)
    }

    /// All suite names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.suites.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SuiteDescriptor)> {
        self.suites.iter().map(|(name, d)| (name.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.suites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.suites.is_empty()
    }

    /// Resolve the requested suite names; an empty request selects every suite.
    ///
    /// Unknown names fail the whole selection before any work starts.
    /// Duplicates are kept, so a suite requested twice runs twice.
    pub fn select<S: AsRef<str>>(
        &self,
        requested: &[S],
    ) -> HarnessResult<Vec<(String, SuiteDescriptor)>> {
        if requested.is_empty() {
            return Ok(self
                .iter()
                .map(|(name, d)| (name.to_string(), d.clone()))
                .collect());
        }

        requested
            .iter()
            .map(|name| {
                let name = name.as_ref();
                self.get(name)
                    .map(|d| (name.to_string(), d.clone()))
                    .ok_or_else(|| HarnessError::UnknownSuite {
                        name: name.to_string(),
                        generation: self.generation.label().to_string(),
                        known: self.names().iter().map(|n| n.to_string()).collect(),
                    })
            })
            .collect()
    }
}
