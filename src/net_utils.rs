pub(crate) mod privilege;
pub(crate) mod resolve;
