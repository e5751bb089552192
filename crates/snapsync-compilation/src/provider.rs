//! Language-specific parsing, supplied by the host

use crate::error::ParseFailure;
use crate::unit::SyntaxTree;
use snapsync_workspace::{DocumentState, OptionSet};
use std::fmt::Debug;

/// Turns document text into syntax trees
///
/// Implementations are black boxes to the tracker. They run on the shared
/// worker pool and must not block for long.
pub trait SyntaxProvider: Send + Sync + Debug + 'static {
    /// Parse `text` of `document` from scratch
    ///
    /// # Errors
    /// Returns [`ParseFailure`] when no tree can be produced
    fn parse(
        &self,
        document: &DocumentState,
        text: &str,
        options: &OptionSet,
    ) -> Result<SyntaxTree, ParseFailure>;

    /// Produce the tree for an edited document, given its previous tree
    ///
    /// Incremental providers override this; the default reparses.
    ///
    /// # Errors
    /// Returns [`ParseFailure`] when no tree can be produced
    fn reparse(
        &self,
        previous: &SyntaxTree,
        document: &DocumentState,
        text: &str,
        options: &OptionSet,
    ) -> Result<SyntaxTree, ParseFailure> {
        let _ = previous;
        self.parse(document, text, options)
    }
}
