//! A pipelined Beanstalkd client.
//!
//! Every command is rendered by a function of [`command`], written to the
//! socket by a single I/O task and answered through a future. Several
//! commands may be in flight on one connection: beanstalkd replies in the
//! order commands were issued, and each reply is decoded against the replies
//! its command allows before it reaches the caller.
//!
//! # Usage
//!
//! ```toml
//! [dependencies]
//! beanstalkp = "^0.1.0"
//! ```
//!
//! Producer
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() {
//! use std::time::Duration;
//! use beanstalkp::Beanstalk;
//!
//! let conn = Beanstalk::new()
//!      .connect()
//!      .await
//!      .expect("connect to beanstalkd server failed");
//!
//! conn.use_tube("jobs").await.unwrap();
//! conn.put_default(b"hello, world").await.unwrap();
//! conn.put(b"hello, rust", 1, Duration::from_secs(10), Duration::from_secs(1800)).await.unwrap();
//! }
//! ```
//!
//! Worker
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() {
//! use beanstalkp::connect;
//!
//! let conn = connect("localhost", 11300)
//!      .await
//!      .expect("connect to beanstalkd server failed");
//!
//! conn.watch("jobs").await.unwrap();
//!
//! let reserved = conn.reserve().await.unwrap();
//! // execute job here...
//! conn.delete(reserved.int("jid").unwrap()).await.unwrap();
//! }
//! ```
//!
//! Pipelining
//!
//! ```no_run
//! #[tokio::main]
//! async fn main() {
//! use beanstalkp::{command, connect};
//!
//! let conn = connect("localhost", 11300).await.unwrap();
//!
//! let used = conn.send(command::list_tube_used());
//! let stats = conn.send(command::stats());
//! println!("{:?}", used.await.unwrap().str("tube"));
//! println!("{:?}", stats.await.unwrap().data());
//! }
//! ```
pub use crate::beanstalk::{connect, Beanstalk, Connection};
pub use crate::command::Command;
pub use crate::dispatcher::{Dispatcher, ReplyFuture, State};
pub use crate::error::{BeanstalkError, BeanstalkResult, ServerError};
pub use crate::job::{Job, JobStats};
pub use crate::response::{Body, Decoded, FieldValue, Reply, ReplyShape, ResponseSpec};

mod beanstalk;
pub mod command;
pub mod config;
pub mod dispatcher;
mod error;
mod job;
pub mod response;
