extern crate flate2;

use std::error::Error;
use std::io::prelude::*;
use std::time;

use beanstalkp::{command, Beanstalk};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let conn = Beanstalk::new()
        .host("localhost")
        .port(11300)
        .connection_timeout(Some(time::Duration::from_secs(1)))
        .connect()
        .await
        .expect("connection failed");

    dbg!(conn.use_tube("jobs").await?);
    dbg!(conn.watch("jobs").await?);
    dbg!(conn.put_default(b"hello").await?);
    dbg!(
        conn.put(
            b"Hello, rust world.",
            0,
            time::Duration::from_secs(100),
            time::Duration::from_secs(1800)
        )
        .await?
    );

    // Several commands in flight at once; replies come back in order.
    let used = conn.send(command::list_tube_used());
    let watched = conn.send(command::list_tubes_watched());
    let tubes = conn.send(command::list_tubes());
    dbg!(used.await?);
    dbg!(watched.await?);
    dbg!(tubes.await?);

    dbg!(conn.peek_ready().await);
    dbg!(conn.peek_buried().await);
    dbg!(conn.peek_delayed().await);
    dbg!(conn.kick(100).await?);
    dbg!(conn.stats_tube("jobs").await?);
    dbg!(conn.pause_tube("jobs", time::Duration::from_secs(1)).await?);
    dbg!(conn.pause_tube("not-found", time::Duration::from_secs(1)).await);

    let mut job = conn.reserve_job().await?;
    dbg!(job.id());
    dbg!(std::str::from_utf8(job.body()))?;
    dbg!(job.reserved());
    dbg!(job.stats().await?);
    dbg!(job.touch().await?);
    dbg!(job.bury_default().await?);
    dbg!(job.kick().await?);

    let mut job = conn.reserve_job().await?;
    dbg!(job.release_default().await?);
    let mut job = conn.reserve_job().await?;
    dbg!(job.delete().await?);

    // should also work with potentially non-UTF-8 payloads
    // puts a gzip encoded message
    let mut e = GzEncoder::new(Vec::new(), Compression::default());
    e.write_all(b"Hello beanstalkp compressed")?;
    let buf = e.finish()?;
    dbg!(conn.put_default(&buf).await?);

    // drain the tube and decode whatever is gzip encoded
    while let Some(mut job) = conn
        .reserve_job_with_timeout(time::Duration::from_secs(0))
        .await?
    {
        let mut s = String::new();
        if GzDecoder::new(job.body()).read_to_string(&mut s).is_ok() {
            dbg!(s);
        }
        job.delete().await?;
    }

    dbg!(conn.ignore("jobs").await?);
    dbg!(conn.stats().await?);
    conn.close();

    Ok(())
}
