//! Diagnostic collection.
//!
//! Validation and planning record every problem they find instead of
//! stopping at the first one, so a single run reports the full set.
//! Severity decides control flow: an [`Severity::Error`] is always fatal,
//! an [`Severity::Advisory`] is fatal unless the run is permissive (then it
//! degrades to a warning), and a [`Severity::Notice`] never affects control
//! flow.

use crate::error::{CodegenError, Result};
use tracing::{info, warn};

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The device cannot express this configuration at all.
    Error,
    /// Risky but encodable; fatal unless the run is permissive.
    Advisory,
    /// Legal but suboptimal; informational only.
    Notice,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Advisory => write!(f, "advisory"),
            Self::Notice => write!(f, "notice"),
        }
    }
}

/// One recorded problem, tied to the layer (and group) that caused it.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Recorded severity (an advisory in a permissive run stays Advisory
    /// here; only its fatality changes).
    pub severity: Severity,
    /// Offending layer id, if layer-scoped.
    pub layer: Option<usize>,
    /// Offending group, if group-scoped.
    pub group: Option<usize>,
    /// Human-readable explanation of the violated constraint.
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.severity)?;
        if let Some(layer) = self.layer {
            write!(f, " [layer {layer}")?;
            if let Some(group) = self.group {
                write!(f, ", group {group}")?;
            }
            write!(f, "]")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Accumulating diagnostic sink for one generation run.
#[derive(Debug)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
    permissive: bool,
    fatal: usize,
}

impl Diagnostics {
    /// Create an empty sink. In permissive mode advisories degrade to
    /// warnings instead of failing the run.
    #[must_use]
    pub const fn new(permissive: bool) -> Self {
        Self {
            items: Vec::new(),
            permissive,
            fatal: 0,
        }
    }

    fn push(&mut self, severity: Severity, layer: Option<usize>, group: Option<usize>, message: String) {
        let diag = Diagnostic {
            severity,
            layer,
            group,
            message,
        };
        match severity {
            Severity::Error => {
                warn!("{diag}");
                self.fatal += 1;
            }
            Severity::Advisory => {
                warn!("{diag}");
                if !self.permissive {
                    self.fatal += 1;
                }
            }
            Severity::Notice => info!("{diag}"),
        }
        self.items.push(diag);
    }

    /// Record a fatal error for a layer.
    pub fn error(&mut self, layer: usize, message: impl Into<String>) {
        self.push(Severity::Error, Some(layer), None, message.into());
    }

    /// Record a fatal error not tied to any layer.
    pub fn error_global(&mut self, message: impl Into<String>) {
        self.push(Severity::Error, None, None, message.into());
    }

    /// Record an advisory for a layer.
    pub fn advisory(&mut self, layer: usize, message: impl Into<String>) {
        self.push(Severity::Advisory, Some(layer), None, message.into());
    }

    /// Record an advisory for a (layer, group) pair.
    pub fn advisory_in_group(&mut self, layer: usize, group: usize, message: impl Into<String>) {
        self.push(Severity::Advisory, Some(layer), Some(group), message.into());
    }

    /// Record a notice for a layer.
    pub fn notice(&mut self, layer: usize, message: impl Into<String>) {
        self.push(Severity::Notice, Some(layer), None, message.into());
    }

    /// All diagnostics recorded so far, in recording order.
    #[must_use]
    pub fn items(&self) -> &[Diagnostic] {
        &self.items
    }

    /// Number of fatal diagnostics recorded so far.
    #[must_use]
    pub const fn fatal_count(&self) -> usize {
        self.fatal
    }

    /// Whether any fatal diagnostic has been recorded.
    #[must_use]
    pub const fn has_fatal(&self) -> bool {
        self.fatal > 0
    }

    /// Fail the run if any fatal diagnostic has been recorded.
    ///
    /// # Errors
    ///
    /// Returns [`CodegenError::Rejected`] carrying the fatal count.
    pub fn check(&self) -> Result<()> {
        if self.has_fatal() {
            return Err(CodegenError::Rejected { count: self.fatal });
        }
        Ok(())
    }

    /// Consume the sink, returning the recorded diagnostics.
    #[must_use]
    pub fn into_items(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_always_fatal() {
        let mut d = Diagnostics::new(true);
        d.error(3, "unsupported feature");
        assert!(d.has_fatal());
        assert!(d.check().is_err());
    }

    #[test]
    fn advisories_degrade_in_permissive_mode() {
        let mut strict = Diagnostics::new(false);
        strict.advisory(0, "overlapping buffer");
        assert!(strict.check().is_err());

        let mut permissive = Diagnostics::new(true);
        permissive.advisory(0, "overlapping buffer");
        assert!(permissive.check().is_ok());
        assert_eq!(permissive.items().len(), 1);
    }

    #[test]
    fn notices_never_affect_control_flow() {
        let mut d = Diagnostics::new(false);
        d.notice(1, "channel count not a multiple of 4");
        assert!(d.check().is_ok());
    }

    #[test]
    fn collection_continues_past_fatal() {
        let mut d = Diagnostics::new(false);
        d.error(0, "first");
        d.error(5, "second");
        d.notice(5, "third");
        assert_eq!(d.items().len(), 3);
        assert_eq!(d.fatal_count(), 2);
    }

    #[test]
    fn display_includes_layer_and_group() {
        let mut d = Diagnostics::new(false);
        d.advisory_in_group(2, 1, "bias bank conflict");
        let text = d.items()[0].to_string();
        assert!(text.contains("layer 2"));
        assert!(text.contains("group 1"));
    }
}
