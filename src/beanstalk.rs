use std::convert::TryFrom;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::command::{self, Command};
use crate::config::{
    DEFAULT_HOST, DEFAULT_JOB_DELAY, DEFAULT_JOB_PRIORITY, DEFAULT_JOB_TTR, DEFAULT_KICK_BOUND,
    DEFAULT_PORT,
};
use crate::dispatcher::{Dispatcher, ReplyFuture, ReplySlot, State};
use crate::error::{BeanstalkError, BeanstalkResult};
use crate::job::Job;
use crate::response::Decoded;

/// Connect to the beanstalkd server at `host:port`.
pub async fn connect(host: &str, port: u16) -> BeanstalkResult<Connection> {
    Beanstalk::new().host(host).port(port).connect().await
}

/// Connection options.
#[derive(Debug, Clone)]
pub struct Beanstalk {
    host: String,
    port: u16,
    connection_timeout: Option<Duration>,
}

impl Default for Beanstalk {
    fn default() -> Self {
        Beanstalk::new()
    }
}

impl Beanstalk {
    /// Create options pointing at `localhost:11300`.
    ///
    /// # Example
    ///
    /// ```no_run
    /// #[tokio::main]
    /// async fn main() {
    /// use std::time::Duration;
    /// use beanstalkp::Beanstalk;
    ///
    /// let conn = Beanstalk::new()
    ///     .host("127.0.0.1")
    ///     .port(11300)
    ///     .connection_timeout(Some(Duration::from_secs(1)))
    ///     .connect()
    ///     .await
    ///     .unwrap();
    /// }
    /// ```
    pub fn new() -> Beanstalk {
        Beanstalk {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connection_timeout: None,
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Give up connecting after `timeout`. `None` waits as long as the OS does.
    pub fn connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Open the TCP connection and start its I/O task.
    pub async fn connect(self) -> BeanstalkResult<Connection> {
        let addr = format!("{}:{}", self.host, self.port);
        let stream = match self.connection_timeout {
            Some(timeout) => tokio::time::timeout(timeout, TcpStream::connect(&addr))
                .await
                .map_err(|_| BeanstalkError::ConnectionTimeout)??,
            None => TcpStream::connect(&addr).await?,
        };
        stream.set_nodelay(true)?;

        tracing::debug!(%addr, "connected to beanstalkd");
        Ok(Connection::spawn(stream, addr))
    }
}

#[derive(Debug)]
enum Message {
    Send { command: Command, slot: ReplySlot },
    Close,
}

/// Handle to a beanstalkd connection.
///
/// Handles are cheap to clone and may be used from many tasks at once;
/// commands from all handles are pipelined over the same socket and every
/// reply is routed back to the command that produced it.
#[derive(Debug, Clone)]
pub struct Connection {
    tx: mpsc::UnboundedSender<Message>,
    addr: String,
}

impl Connection {
    fn spawn(stream: TcpStream, addr: String) -> Connection {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(stream, rx, addr.clone()));
        Connection { tx, addr }
    }

    /// Address this connection was opened to.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Whether the I/O task has stopped. No command can be sent any more.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue `command` for writing and return the future of its reply.
    ///
    /// Commands are written in the order `send` is called. Dropping the
    /// returned future does not cancel the command: its reply is still read
    /// and discarded.
    pub fn send(&self, command: Command) -> ReplyFuture {
        let (slot, future) = ReplyFuture::channel();
        let message = Message::Send { command, slot };
        if let Err(mpsc::error::SendError(message)) = self.tx.send(message) {
            if let Message::Send { slot, .. } = message {
                let _ = slot.send(Err(BeanstalkError::ConnectionClosed));
            }
        }
        future
    }

    /// Close the connection. Commands still waiting for a reply fail with
    /// `ConnectionClosed`.
    pub fn close(&self) {
        let _ = self.tx.send(Message::Close);
    }

    /// Put a job into the current tube with default priority, delay and TTR.
    pub async fn put_default(&self, body: &[u8]) -> BeanstalkResult<Decoded> {
        self.put(body, DEFAULT_JOB_PRIORITY, DEFAULT_JOB_DELAY, DEFAULT_JOB_TTR)
            .await
    }

    /// Put a job into the current tube. The reply's `jid` field is the new job id;
    /// its state is `buried` when the server ran out of memory to grow the
    /// priority queue.
    ///
    /// # Example
    ///
    /// ```no_run
    /// #[tokio::main]
    /// async fn main() {
    /// use std::time::Duration;
    /// use beanstalkp::Beanstalk;
    ///
    /// let conn = Beanstalk::new().connect().await.unwrap();
    ///
    /// let inserted = conn
    ///     .put(b"Hello", 0, Duration::from_secs(0), Duration::from_secs(60))
    ///     .await
    ///     .unwrap();
    /// dbg!(inserted.int("jid"));
    /// }
    /// ```
    pub async fn put(
        &self,
        body: &[u8],
        priority: u32,
        delay: Duration,
        ttr: Duration,
    ) -> BeanstalkResult<Decoded> {
        self.send(command::put(body, priority, delay, ttr)?).await
    }

    /// Use a tube for subsequent `put` commands.
    pub async fn use_tube(&self, tube: &str) -> BeanstalkResult<Decoded> {
        self.send(command::use_tube(tube)?).await
    }

    /// Wait for a job from the watched tubes.
    pub async fn reserve(&self) -> BeanstalkResult<Decoded> {
        self.send(command::reserve()).await
    }

    /// Wait at most `timeout` for a job. The state is `timeout` if none came.
    pub async fn reserve_with_timeout(&self, timeout: Duration) -> BeanstalkResult<Decoded> {
        let seconds = i64::try_from(timeout.as_secs()).map_err(|_| {
            BeanstalkError::InvalidArgument(format!("timeout {:?} is too large", timeout))
        })?;
        self.send(command::reserve_with_timeout(seconds)?).await
    }

    /// Reserve a job and wrap it into a `Job` handle.
    ///
    /// # Example
    ///
    /// ```no_run
    /// #[tokio::main]
    /// async fn main() {
    /// use beanstalkp::Beanstalk;
    ///
    /// let conn = Beanstalk::new().connect().await.unwrap();
    ///
    /// let mut job = conn.reserve_job().await.unwrap();
    /// // execute job here...
    /// job.delete().await.unwrap();
    /// }
    /// ```
    pub async fn reserve_job(&self) -> BeanstalkResult<Job> {
        let reserved = self.reserve().await?;
        Job::from_decoded(self.clone(), reserved, true)
    }

    /// Like `reserve_job`, returning `None` when `timeout` expires first.
    pub async fn reserve_job_with_timeout(
        &self,
        timeout: Duration,
    ) -> BeanstalkResult<Option<Job>> {
        let reserved = self.reserve_with_timeout(timeout).await?;
        if reserved.state() == "timeout" {
            return Ok(None);
        }
        Job::from_decoded(self.clone(), reserved, true).map(Some)
    }

    pub async fn delete(&self, id: u64) -> BeanstalkResult<Decoded> {
        self.send(command::delete(id)).await
    }

    /// Put a reserved job back into the ready queue.
    pub async fn release(
        &self,
        id: u64,
        priority: u32,
        delay: Duration,
    ) -> BeanstalkResult<Decoded> {
        self.send(command::release(id, priority, delay)).await
    }

    pub async fn bury(&self, id: u64, priority: u32) -> BeanstalkResult<Decoded> {
        self.send(command::bury(id, priority)).await
    }

    /// Add a tube to the watch list. The reply's `count` is the size of the list.
    pub async fn watch(&self, tube: &str) -> BeanstalkResult<Decoded> {
        self.send(command::watch(tube)?).await
    }

    /// Remove a tube from the watch list. Ignoring the last watched tube
    /// fails with `NOT_IGNORED`.
    pub async fn ignore(&self, tube: &str) -> BeanstalkResult<Decoded> {
        self.send(command::ignore(tube)?).await
    }

    pub async fn peek(&self, id: u64) -> BeanstalkResult<Decoded> {
        self.send(command::peek(id)).await
    }

    /// Peek a job by id, without reserving it.
    pub async fn peek_job(&self, id: u64) -> BeanstalkResult<Job> {
        let found = self.peek(id).await?;
        Job::from_decoded(self.clone(), found, false)
    }

    pub async fn peek_ready(&self) -> BeanstalkResult<Decoded> {
        self.send(command::peek_ready()).await
    }

    pub async fn peek_delayed(&self) -> BeanstalkResult<Decoded> {
        self.send(command::peek_delayed()).await
    }

    pub async fn peek_buried(&self) -> BeanstalkResult<Decoded> {
        self.send(command::peek_buried()).await
    }

    /// Kick at most `bound` jobs into the ready queue.
    pub async fn kick(&self, bound: u32) -> BeanstalkResult<Decoded> {
        self.send(command::kick(bound)).await
    }

    pub async fn kick_default(&self) -> BeanstalkResult<Decoded> {
        self.kick(DEFAULT_KICK_BOUND).await
    }

    /// Kick a single buried or delayed job.
    pub async fn kick_job(&self, id: u64) -> BeanstalkResult<Decoded> {
        self.send(command::kick_job(id)).await
    }

    /// Ask for more time to work on a reserved job.
    pub async fn touch(&self, id: u64) -> BeanstalkResult<Decoded> {
        self.send(command::touch(id)).await
    }

    /// Server statistics. The body is a YAML mapping.
    pub async fn stats(&self) -> BeanstalkResult<Decoded> {
        self.send(command::stats()).await
    }

    pub async fn stats_job(&self, id: u64) -> BeanstalkResult<Decoded> {
        self.send(command::stats_job(id)).await
    }

    pub async fn stats_tube(&self, tube: &str) -> BeanstalkResult<Decoded> {
        self.send(command::stats_tube(tube)?).await
    }

    /// Names of every existing tube, as a YAML list.
    pub async fn list_tubes(&self) -> BeanstalkResult<Decoded> {
        self.send(command::list_tubes()).await
    }

    pub async fn list_tube_used(&self) -> BeanstalkResult<Decoded> {
        self.send(command::list_tube_used()).await
    }

    pub async fn list_tubes_watched(&self) -> BeanstalkResult<Decoded> {
        self.send(command::list_tubes_watched()).await
    }

    /// Delay any new job being reserved from `tube` for `delay`.
    pub async fn pause_tube(&self, tube: &str, delay: Duration) -> BeanstalkResult<Decoded> {
        self.send(command::pause_tube(tube, delay)?).await
    }
}

/// Write commands in the order they were queued. Flushes once the queue is
/// momentarily empty.
async fn write_commands(
    mut writer: BufWriter<OwnedWriteHalf>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> BeanstalkResult<()> {
    while let Some(command) = commands.recv().await {
        writer.write_all(command.bytes()).await?;
        while let Ok(command) = commands.try_recv() {
            writer.write_all(command.bytes()).await?;
        }
        writer.flush().await?;
    }
    writer.shutdown().await?;
    Ok(())
}

/// Owns the socket. Queues commands for the writer task in the order they
/// are enqueued, and feeds every inbound chunk to the dispatcher. Reading
/// never waits on a write. Once all handles are dropped it keeps reading
/// until the commands in flight are answered.
async fn run(stream: TcpStream, mut rx: mpsc::UnboundedReceiver<Message>, addr: String) {
    let (mut reader, writer) = stream.into_split();
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let mut writing = tokio::spawn(write_commands(BufWriter::new(writer), write_rx));
    let mut writer_done = false;
    let mut graceful = false;

    let mut dispatcher = Dispatcher::new();
    dispatcher.on_connected();

    let mut buf = BytesMut::with_capacity(4096);
    let mut accepting = true;

    while accepting || dispatcher.pending_len() > 0 {
        tokio::select! {
            message = rx.recv(), if accepting => match message {
                Some(Message::Send { command, slot }) => {
                    if !dispatcher.enqueue(&command, slot) {
                        break;
                    }
                    tracing::trace!(verb = command.verb(), "sending command");
                    if write_tx.send(command).is_err() {
                        break;
                    }
                }
                Some(Message::Close) => {
                    graceful = true;
                    break;
                }
                None => accepting = false,
            },
            written = &mut writing, if !writer_done => {
                writer_done = true;
                match written {
                    Ok(Err(err)) => tracing::warn!(%addr, error = %err, "write failed"),
                    Ok(Ok(())) => {}
                    Err(err) => tracing::warn!(%addr, error = %err, "writer task failed"),
                }
                break;
            },
            read = reader.read_buf(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(%addr, "connection closed by server");
                    break;
                }
                Ok(_) => {
                    dispatcher.on_data(&buf);
                    buf.clear();
                    if dispatcher.state() == State::Closed {
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(%addr, error = %err, "read failed");
                    break;
                }
            },
        }
    }

    dispatcher.on_connection_lost();
    rx.close();
    while let Ok(message) = rx.try_recv() {
        if let Message::Send { slot, .. } = message {
            let _ = slot.send(Err(BeanstalkError::ConnectionClosed));
        }
    }

    // An explicit close lets queued commands reach the server first.
    drop(write_tx);
    if !writer_done {
        if graceful {
            let _ = writing.await;
        } else {
            writing.abort();
        }
    }
    tracing::debug!(%addr, "connection task stopped");
}
