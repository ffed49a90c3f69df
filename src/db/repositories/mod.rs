pub(crate) mod domains;
pub(crate) mod flattrs;
pub(crate) mod meta;
pub(crate) mod pages;
pub(crate) mod submissions;
pub(crate) mod visits;
