//! Writing recovered attachments to disk: scoped staging for upload and
//! plain export to a directory.

pub mod attachment;
pub mod staging;
