//! Occupation taxonomy: corpus loading, embedding-based title matching and
//! tenure grouping by occupation code.

mod corpus;
mod grouper;
mod matcher;

pub use corpus::{
    AlternateTitleCorpus, AlternateTitleEntry, FlagReason, FlaggedRecord, OccupationRecord,
    SourcePrefixPolicy, load_alternate_titles, load_occupation_data, parse_alternate_titles,
    parse_occupation_data,
};
pub use grouper::{GroupedPosition, GroupingOutcome, OccupationGroup, UNCLASSIFIED, group_by_occupation};
pub use matcher::{MatchOptions, MatchResult, MatchTable, match_positions, match_positions_or_skip};
