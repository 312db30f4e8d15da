use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaqError {
    #[error("corpus is empty")]
    EmptyCorpus,

    #[error("duplicate question in corpus: {0:?}")]
    DuplicateQuestion(String),

    #[error("invalid retrieval config: {0}")]
    InvalidConfig(String),

    #[error("labeled query set is empty")]
    EmptyLabeledSet,

    #[error("label for query {query:?} names a question not in the corpus: {relevant_question:?}")]
    UnknownLabel {
        query: String,
        relevant_question: String,
    },

    #[error(transparent)]
    Embedding(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, FaqError>;
