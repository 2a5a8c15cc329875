//! Client for the external package manager (Homebrew).

use crate::ecosystem::EcosystemDescriptor;
use crate::process::{CommandRunner, OutputSink};
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Metadata for one formula
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogInfo {
    pub resolved_version: String,
    pub is_installed: bool,
}

#[derive(Debug, Deserialize)]
struct FormulaJson {
    name: String,
    #[serde(default)]
    full_name: Option<String>,
    #[serde(default)]
    versions: FormulaVersions,
    #[serde(default)]
    installed: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct FormulaVersions {
    #[serde(default)]
    stable: Option<String>,
}

impl FormulaJson {
    /// Whether this entry answers a query for `identifier`
    fn answers(&self, identifier: &str) -> bool {
        if self.name == identifier {
            return true;
        }
        match &self.full_name {
            Some(full) => {
                full == identifier || full.rsplit('/').next() == Some(identifier)
            }
            None => false,
        }
    }
}

#[derive(Clone)]
pub struct PackageManagerClient {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl PackageManagerClient {
    pub fn new(runner: Arc<dyn CommandRunner>, program: impl Into<String>) -> Self {
        Self {
            runner,
            program: program.into(),
        }
    }

    /// Formulae belonging to an ecosystem.
    ///
    /// The tool only does substring search, so its results are re-checked
    /// against the ecosystem's own pattern.
    pub async fn search(&self, descriptor: &EcosystemDescriptor) -> Vec<String> {
        let output = match self
            .runner
            .output(&self.program, &["search", descriptor.package_base])
            .await
        {
            Ok(output) if output.success => output,
            Ok(output) => {
                debug!("{} search failed: {}", self.program, output.stderr.trim());
                return Vec::new();
            }
            Err(e) => {
                debug!("Could not run {}: {}", self.program, e);
                return Vec::new();
            }
        };

        let pattern = match Regex::new(descriptor.search_pattern) {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!("Invalid search pattern {}: {}", descriptor.search_pattern, e);
                return Vec::new();
            }
        };

        let mut found: Vec<String> = Vec::new();
        for line in output.stdout.lines() {
            if line.trim_start().starts_with("==>") {
                continue;
            }
            for token in line.split_whitespace() {
                let token = token.trim_end_matches('✔');
                if pattern.is_match(token) && !found.iter().any(|f| f == token) {
                    found.push(token.to_string());
                }
            }
        }
        found
    }

    /// Version and installed state for each identifier.
    ///
    /// One batched query first; if that yields nothing for a multi-formula
    /// request, each identifier is queried on its own so one unknown name
    /// cannot hide the rest.
    pub async fn batch_info(&self, identifiers: &[String]) -> HashMap<String, CatalogInfo> {
        if identifiers.is_empty() {
            return HashMap::new();
        }

        let batch = self.query_info(identifiers).await;
        if !batch.is_empty() || identifiers.len() == 1 {
            return batch;
        }

        debug!("Batched info was empty, querying {} formulae one by one", identifiers.len());
        let mut merged = HashMap::new();
        for identifier in identifiers {
            merged.extend(self.query_info(std::slice::from_ref(identifier)).await);
        }
        merged
    }

    async fn query_info(&self, identifiers: &[String]) -> HashMap<String, CatalogInfo> {
        let mut args = vec!["info", "--json"];
        args.extend(identifiers.iter().map(String::as_str));

        let stdout = match self.runner.output(&self.program, &args).await {
            Ok(output) if output.success => output.stdout,
            Ok(output) => {
                debug!("{} info failed: {}", self.program, output.stderr.trim());
                return HashMap::new();
            }
            Err(e) => {
                debug!("Could not run {}: {}", self.program, e);
                return HashMap::new();
            }
        };

        let formulae: Vec<FormulaJson> = match serde_json::from_str(&stdout) {
            Ok(formulae) => formulae,
            Err(e) => {
                debug!("Unreadable {} info output: {}", self.program, e);
                return HashMap::new();
            }
        };

        identifiers
            .iter()
            .filter_map(|identifier| {
                let formula = formulae.iter().find(|f| f.answers(identifier))?;
                let resolved_version = formula.versions.stable.clone()?;
                Some((
                    identifier.clone(),
                    CatalogInfo {
                        resolved_version,
                        is_installed: !formula.installed.is_empty(),
                    },
                ))
            })
            .collect()
    }

    pub async fn install(&self, identifier: &str, sink: &OutputSink) -> bool {
        self.run_streaming("install", identifier, sink).await
    }

    pub async fn uninstall(&self, identifier: &str, sink: &OutputSink) -> bool {
        self.run_streaming("uninstall", identifier, sink).await
    }

    async fn run_streaming(&self, action: &str, identifier: &str, sink: &OutputSink) -> bool {
        info!("{} {} {}", self.program, action, identifier);
        match self
            .runner
            .stream(&self.program, &[action, identifier], sink)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                sink.line(format!("{} {} {} failed", self.program, action, identifier));
                false
            }
            Err(e) => {
                sink.line(format!("Could not run {}: {}", self.program, e));
                false
            }
        }
    }
}
