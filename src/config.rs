use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Knobs for [`crate::compile_with`].
///
/// Deserializable so a host can keep it next to the rest of its configuration;
/// missing fields fall back to [`CompileOptions::default`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Reject grammars where two rules of one state both qualify for the same
    /// lookahead after FIRST-set expansion. When off, the first declared rule
    /// wins and a warning is logged.
    pub reject_first_set_overlap: bool,

    /// Hand every prepared action to [`crate::ActionEvaluator::check`] while
    /// compiling. Actions are always prepared, so syntax errors are reported
    /// either way.
    pub check_actions: bool,

    /// Fail a parse whose start symbol returns before the end of input.
    pub require_end_of_input: bool,

    /// Deepest state nesting a parse may reach before failing with
    /// [`crate::ParseError::RecursionLimit`]. Right-recursive lists nest once
    /// per element; raising this needs a correspondingly larger thread stack.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            reject_first_set_overlap: false,
            check_actions: true,
            require_end_of_input: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
