mod articles;
mod schema;
mod sites;
mod stats;
mod types;

pub use articles::next_uindex;
pub use schema::Database;
pub use types::{
    ArchiveCandidate, Article, DatabaseError, NewArticle, RankedSite, RefererHit, SimilarArticle,
    Site, SiteCreator, SiteSeed, Status, TaggedArticle,
};
