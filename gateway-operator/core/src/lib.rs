#![deny(rust_2018_idioms)]
#![forbid(unsafe_code)]

pub mod builders;
pub mod checksum;
pub mod descriptor;
pub mod encoding;
pub mod graphman;
pub mod portal;
pub mod summary;
pub mod template;
mod translate;


pub use self::{
    descriptor::ApiDescriptor,
    graphman::Bundle,
    translate::{translate, Translation},
};

/// Folder that holds every portal-sourced web API service on a gateway.
pub const PORTAL_FOLDER: &str = "/Portal APIs";

/// Folder that holds the policy fragments of portal-sourced APIs.
pub const PORTAL_FRAGMENT_FOLDER: &str = "/Portal APIs/Fragments";
