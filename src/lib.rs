#![doc = include_str!("../README.md")]

mod client;
/// NNTP command builders and response parsers
pub mod commands;
mod config;
/// Header field decoding and date parsing
pub mod decode;
mod error;
mod indexer;
/// Release matcher registry
pub mod matcher;
/// Range planning for XOVER fetches
pub mod planner;
mod pool;
mod response;
/// The durable article index
pub mod store;
/// Task types, queue, and shutdown signalling
pub mod tasks;
mod worker;

pub use client::NntpClient;
pub use commands::{ActiveGroup, GroupInfo, OverviewRecord};
pub use config::{IndexerConfig, ServerConfig, netrc_lookup};
pub use decode::{DecodedHeader, decode_header, parse_article_date};
pub use error::{IndexError, Result};
pub use indexer::Indexer;
pub use matcher::{Matcher, MatcherRegistry, SegmentFields};
pub use planner::Chunk;
pub use pool::{NntpPool, PoolSet, RetryConfig};
pub use response::{NntpResponse, codes};
pub use store::{Article, Group, OverviewInsert, Segment, Store, StoreStats};
pub use tasks::{ShutdownHandle, ShutdownSignal, Task, TaskQueue};
pub use worker::Worker;
