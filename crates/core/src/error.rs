use thiserror::Error;

use crate::model::{ParseIdError, QuestionError, UnknownFilterError};

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    ParseId(#[from] ParseIdError),
    #[error(transparent)]
    Filter(#[from] UnknownFilterError),
}
