//! Resumable, segmented HTTP download engine.
//!
//! A [`downloader::Downloader`] asks the server for the remote file's
//! length, lays it out as a [`block_store::BlockStore`] of fixed-size blocks
//! and fetches the missing blocks over several [`channel::Channel`]s. Progress survives restarts
//! through the store's journal.

pub mod block_store;
pub mod cache;
pub mod channel;
pub mod checksum;
pub mod config;
pub mod control;
pub mod downloader;
pub mod logging;
pub mod naming;
pub mod progress;
pub mod range;
pub mod retry;
pub mod transport;
