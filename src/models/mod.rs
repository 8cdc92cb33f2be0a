mod article;
mod report;
mod video;

pub use article::{
    Article, ArticleFilter, ArticleStatus, Candidate, FieldUpdate, NewArticle, ParseStatusError,
    Transition,
};
pub use report::{CandidateOutcome, RunReport};
pub use video::{JobStatus, RenderJob, RenderOutput};
