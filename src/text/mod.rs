//! Text post-processing for extracted block text.
//!
//! - [`normalize`]: ligatures, quotes, dashes, invisible characters
//! - [`HyphenationHandler`]: joins lines, repairing words broken at line ends
//! - [`SpacingRepairer`]: inserts spaces into runs of words glued together
//!
//! All three only ever touch whitespace and typographic variants; letters and
//! digits pass through in order.

pub mod hyphenation;
pub mod lexicon;
pub mod normalize;
pub mod spacing;

pub use hyphenation::{HyphenationHandler, LineJoin};
pub use lexicon::Lexicon;
pub use normalize::normalize;
pub use spacing::{SpacingRepairer, DEFAULT_PRESERVE_TERMS};
