mod client;

pub use client::{RemoteClient, RemoteDetails};
