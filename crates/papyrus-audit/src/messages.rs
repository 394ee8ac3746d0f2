//! Report messages — spec §4.6 "a tree of human-readable messages
//! partitioned into Fatal and Warning". Message text is produced by
//! `Display`, kept separate from the classifier logic that decides whether
//! a message fires at all (spec §4.6 ambient note).

use std::fmt;

/// A fatal finding: `disable_saving` is set whenever the report carries at
/// least one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FatalMessage {
    /// Decoding itself marked the block broken.
    BrokenBlock,
    /// Plugin count hit one of the two known-bad totals.
    PluginCountExtreme(u32),
    /// Some part of the decode truncated early.
    Truncated {
        /// Which part truncated.
        where_: &'static str,
        /// How many entries are missing, if known.
        missing: Option<u32>,
    },
    /// The string table hit the legacy string-table-bug escape.
    StringTableBug,
}

impl fmt::Display for FatalMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FatalMessage::BrokenBlock => write!(f, "broken Papyrus block"),
            FatalMessage::PluginCountExtreme(n) => write!(f, "plugin count {n}"),
            FatalMessage::Truncated { where_, missing: Some(n) } => {
                write!(f, "Truncated {where_}, {n} {}", plural(*n, "string", "strings"))
            }
            FatalMessage::Truncated { where_, missing: None } => write!(f, "Truncated {where_}"),
            FatalMessage::StringTableBug => write!(f, "string-table bug"),
        }
    }
}

/// A non-fatal finding: any one of these sets `should_worry`.
#[derive(Debug, Clone, PartialEq)]
pub enum WarningMessage {
    /// At least one unattached instance, past the game-variant threshold.
    UnattachedInstances(usize),
    /// At least one element with an unresolved class.
    UndefinedElements(usize),
    /// At least one undefined, not-yet-terminated thread.
    UndefinedNonTerminatedThreads(usize),
    /// At least one script whose parent name did not resolve.
    MissingParent(usize),
    /// At least one script with an empty parent name.
    EmptyParentName(usize),
    /// Stack count or total frame count crossed the high-water mark.
    StackOrFrameCountHigh {
        /// Total suspended-stack count.
        stacks: usize,
        /// Total frame count across every active script.
        frames: usize,
    },
    /// At least one thread with an unusually deep call stack.
    DeepThread {
        /// How many threads crossed the threshold.
        count: usize,
    },
    /// The savefile shrank by at least 5% against the prior sequential save.
    SavefileShrink(f64),
    /// A namespace with resident change-forms in the prior save vanished.
    CanaryNamespaceLoss(String),
    /// A script's canary field transitioned non-zero to zero.
    ZeroedCanary {
        /// Owning script name.
        script: String,
        /// The canary's previous value.
        previous: i32,
    },
    /// At least one memberless script instance.
    MemberlessInstances(usize),
    /// At least one script instance with a variable-count/member-count mismatch.
    DefinitionMismatchInstances(usize),
}

fn plural<'a>(n: u32, singular: &'a str, plural: &'a str) -> &'a str {
    if n == 1 {
        singular
    } else {
        plural
    }
}

fn plural_usize(n: usize) -> &'static str {
    if n == 1 {
        ""
    } else {
        "s"
    }
}

impl fmt::Display for WarningMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarningMessage::UnattachedInstances(n) => {
                write!(f, "{n} unattached instance{}", plural_usize(*n))
            }
            WarningMessage::UndefinedElements(n) => {
                write!(f, "{n} undefined element{}", plural_usize(*n))
            }
            WarningMessage::UndefinedNonTerminatedThreads(n) => {
                write!(f, "{n} undefined non-terminated thread{}", plural_usize(*n))
            }
            WarningMessage::MissingParent(n) => {
                write!(f, "{n} script{} with missing parent", plural_usize(*n))
            }
            WarningMessage::EmptyParentName(n) => {
                write!(f, "{n} script{} with empty parent name", plural_usize(*n))
            }
            WarningMessage::StackOrFrameCountHigh { stacks, frames } => {
                write!(f, "high stack/frame count (stacks={stacks}, frames={frames})")
            }
            WarningMessage::DeepThread { count } => {
                write!(f, "{count} thread{} with at least 100 frames", plural_usize(*count))
            }
            WarningMessage::SavefileShrink(pct) => {
                write!(f, "savefile data shrank by {:.1}% against the prior save", pct * 100.0)
            }
            WarningMessage::CanaryNamespaceLoss(ns) => {
                write!(f, "canary namespace loss ({ns})")
            }
            WarningMessage::ZeroedCanary { script, previous } => {
                write!(f, "1 zeroed canary ({script}: 0x{previous:X}\u{2192}0)")
            }
            WarningMessage::MemberlessInstances(n) => {
                write!(f, "{n} memberless instance{}", plural_usize(*n))
            }
            WarningMessage::DefinitionMismatchInstances(n) => {
                write!(f, "{n} instance{} with a definition mismatch", plural_usize(*n))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_string_table_message_matches_seed_text() {
        let msg = FatalMessage::Truncated { where_: "string-table", missing: Some(2) };
        assert_eq!(msg.to_string(), "Truncated string-table, 2 strings missing");
    }

    #[test]
    fn undefined_element_message_pluralizes_correctly() {
        assert_eq!(WarningMessage::UndefinedElements(1).to_string(), "1 undefined element");
        assert_eq!(WarningMessage::UndefinedElements(2).to_string(), "2 undefined elements");
    }

    #[test]
    fn zeroed_canary_message_matches_seed_text() {
        let msg = WarningMessage::ZeroedCanary { script: "S".into(), previous: 0x1234 };
        assert_eq!(msg.to_string(), "1 zeroed canary (S: 0x1234\u{2192}0)");
    }
}
