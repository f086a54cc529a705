pub mod olx;
pub mod text;
pub mod traits;
pub mod types;

pub use olx::OlxScraper;
pub use traits::ListingScraper;
pub use types::SearchFilters;
