use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::beanstalk::Connection;
use crate::config::DEFAULT_JOB_DELAY;
use crate::config::DEFAULT_JOB_PRIORITY;
use crate::error::{BeanstalkError, BeanstalkResult};
use crate::response::{Body, Decoded};

/// `Job` is a simple abstraction about beanstalkd job.
#[derive(Debug, Clone)]
pub struct Job {
    conn: Connection,
    id: u64,
    body: Vec<u8>,
    reserved: bool,
}

/// Statistics of one job, as returned by `stats-job`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobStats {
    pub id: u64,
    pub tube: String,
    pub state: String,
    pub pri: u32,
    pub age: u64,
    pub delay: u64,
    pub ttr: u64,
    pub time_left: u64,
    #[serde(default)]
    pub file: u64,
    pub reserves: u64,
    pub timeouts: u64,
    pub releases: u64,
    pub buries: u64,
    pub kicks: u64,
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(
            f,
            "Job(id: {}, reserved: {}, body: \"{:?}\")",
            self.id, self.reserved, self.body
        )
    }
}

impl Job {
    /// Initialize and return the `Job` object.
    pub fn new(conn: Connection, job_id: u64, body: Vec<u8>, reserved: bool) -> Job {
        Job {
            conn,
            id: job_id,
            body,
            reserved,
        }
    }

    /// Build a job from a `RESERVED` or `FOUND` reply.
    pub(crate) fn from_decoded(
        conn: Connection,
        decoded: Decoded,
        reserved: bool,
    ) -> BeanstalkResult<Job> {
        let id = decoded.int("jid").ok_or_else(|| {
            BeanstalkError::UnexpectedResponse(format!(
                "{} reply carries no job id",
                decoded.state()
            ))
        })?;

        match decoded.into_data() {
            Some(Body::Raw(body)) => Ok(Job::new(conn, id, body, reserved)),
            _ => Err(BeanstalkError::UnexpectedResponse(format!(
                "reply for job {} carries no body",
                id
            ))),
        }
    }

    /// Return job id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Return job body.
    pub fn body(&self) -> &[u8] {
        &self.body[..]
    }

    /// Return job reserving status.
    pub fn reserved(&self) -> bool {
        self.reserved
    }

    /// Delete this job.
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
    /// job.delete().await.unwrap();
    /// }
    /// ```
    pub async fn delete(&mut self) -> BeanstalkResult<()> {
        self.conn.delete(self.id).await?;
        self.reserved = false;
        Ok(())
    }

    /// Release this job back to the ready queue with its current priority and no delay.
    pub async fn release_default(&mut self) -> BeanstalkResult<()> {
        let priority = self.priority().await;
        self.release(priority, DEFAULT_JOB_DELAY).await
    }

    /// Release this job back to the ready queue with custom priority and delay.
    /// Does nothing unless the job is reserved.
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
    /// let mut job = conn.reserve_job().await.unwrap();
    /// job.release(0, Duration::from_secs(0)).await.unwrap();
    /// }
    /// ```
    pub async fn release(&mut self, priority: u32, delay: Duration) -> BeanstalkResult<()> {
        if !self.reserved {
            return Ok(());
        }

        self.conn.release(self.id, priority, delay).await?;
        self.reserved = false;
        Ok(())
    }

    /// Bury this job with its current priority.
    pub async fn bury_default(&mut self) -> BeanstalkResult<()> {
        let priority = self.priority().await;
        self.bury(priority).await
    }

    /// Bury this job with custom priority.
    pub async fn bury(&mut self, priority: u32) -> BeanstalkResult<()> {
        if !self.reserved {
            return Ok(());
        }

        self.conn.bury(self.id, priority).await?;
        self.reserved = false;
        Ok(())
    }

    /// Kick this job to ready queue.
    pub async fn kick(&mut self) -> BeanstalkResult<()> {
        self.conn.kick_job(self.id).await?;
        Ok(())
    }

    /// Touch this reserved job, requesting more time to work on it.
    pub async fn touch(&mut self) -> BeanstalkResult<()> {
        if !self.reserved {
            return Ok(());
        }

        self.conn.touch(self.id).await?;
        Ok(())
    }

    /// Return statistical information about this job.
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
    /// let job = conn.peek_job(1).await.unwrap();
    /// let job_stats = job.stats().await.unwrap();
    /// dbg!(job_stats);
    /// }
    /// ```
    pub async fn stats(&self) -> BeanstalkResult<JobStats> {
        self.conn.stats_job(self.id).await?.data_as()
    }

    /// Return the job priority from this job stats. If not found, return the
    /// `DEFAULT_JOB_PRIORITY`.
    async fn priority(&self) -> u32 {
        self.stats()
            .await
            .map(|stats| stats.pri)
            .unwrap_or(DEFAULT_JOB_PRIORITY)
    }
}
