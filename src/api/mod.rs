pub(crate) mod answers;
pub(crate) mod documents;
pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod handlers;
pub(crate) mod router;
pub(crate) mod upload_form;
pub(crate) mod validation;
