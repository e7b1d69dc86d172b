//! One function per beanstalkd verb.
//!
//! Each function validates its arguments, renders the exact command line and
//! pairs it with the replies the server may answer with. Arguments are
//! checked before anything reaches the network.

use std::time::Duration;

use crate::config::{MAX_JOB_SIZE, MAX_TUBE_NAME_LEN};
use crate::error::{BeanstalkError, BeanstalkResult};
use crate::response::{raw_body, yaml_body, ReplyShape, ResponseSpec};

/// A rendered command, ready to be written once.
#[derive(Debug, Clone)]
pub struct Command {
    verb: &'static str,
    bytes: Vec<u8>,
    spec: ResponseSpec,
}

impl Command {
    fn new(verb: &'static str, line: String, spec: ResponseSpec) -> Command {
        Command {
            verb,
            bytes: line.into_bytes(),
            spec,
        }
    }

    pub fn verb(&self) -> &'static str {
        self.verb
    }

    /// Wire bytes: command line, and the body for `put`.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes[..]
    }

    pub fn spec(&self) -> &ResponseSpec {
        &self.spec
    }
}

const INSERTED: ResponseSpec = ResponseSpec::new(&[
    ReplyShape::new("INSERTED", "ok", &["jid"]),
    ReplyShape::new("BURIED", "buried", &["jid"]),
]);
const USING: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("USING", "ok", &["tube"])]);
const RESERVED: ResponseSpec =
    ResponseSpec::new(&[ReplyShape::new("RESERVED", "ok", &["jid", "bytes"]).with_body(raw_body)]);
const RESERVED_OR_TIMEOUT: ResponseSpec = ResponseSpec::new(&[
    ReplyShape::new("RESERVED", "ok", &["jid", "bytes"]).with_body(raw_body),
    ReplyShape::new("TIMED_OUT", "timeout", &[]),
]);
const DELETED: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("DELETED", "ok", &[])]);
const RELEASED: ResponseSpec = ResponseSpec::new(&[
    ReplyShape::new("RELEASED", "ok", &[]),
    ReplyShape::new("BURIED", "buried", &[]),
]);
const BURIED: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("BURIED", "ok", &[])]);
const WATCHING: ResponseSpec =
    ResponseSpec::new(&[ReplyShape::new("WATCHING", "ok", &["count"])]);
const FOUND: ResponseSpec =
    ResponseSpec::new(&[ReplyShape::new("FOUND", "ok", &["jid", "bytes"]).with_body(raw_body)]);
const KICKED: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("KICKED", "ok", &["count"])]);
const KICKED_JOB: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("KICKED", "ok", &[])]);
const TOUCHED: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("TOUCHED", "ok", &[])]);
const PAUSED: ResponseSpec = ResponseSpec::new(&[ReplyShape::new("PAUSED", "ok", &[])]);
const YAML_OK: ResponseSpec =
    ResponseSpec::new(&[ReplyShape::new("OK", "ok", &["bytes"]).with_body(yaml_body)]);

/// Check a tube name: letters, digits and `+();.$`, plus `_` and `-` after
/// the first character, at most 200 bytes.
pub fn check_name(name: &str) -> BeanstalkResult<()> {
    fn is_name_start(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b"+();.$".contains(&b)
    }

    let valid = match name.as_bytes().split_first() {
        Some((&first, rest)) => {
            name.len() <= MAX_TUBE_NAME_LEN
                && is_name_start(first)
                && rest
                    .iter()
                    .all(|&b| is_name_start(b) || b == b'_' || b == b'-')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(BeanstalkError::InvalidName(name.to_string()))
    }
}

/// `put <pri> <delay> <ttr> <bytes>`, followed by the body.
pub fn put(
    body: &[u8],
    priority: u32,
    delay: Duration,
    ttr: Duration,
) -> BeanstalkResult<Command> {
    if body.len() >= MAX_JOB_SIZE {
        return Err(BeanstalkError::JobTooLarge {
            size: body.len(),
            max: MAX_JOB_SIZE,
        });
    }

    let line = format!(
        "put {} {} {} {}\r\n",
        priority,
        delay.as_secs(),
        ttr.as_secs(),
        body.len()
    );
    let mut bytes = Vec::with_capacity(line.len() + body.len() + 2);
    bytes.extend_from_slice(line.as_bytes());
    bytes.extend_from_slice(body);
    bytes.extend_from_slice(b"\r\n");

    Ok(Command {
        verb: "put",
        bytes,
        spec: INSERTED,
    })
}

pub fn use_tube(tube: &str) -> BeanstalkResult<Command> {
    check_name(tube)?;
    Ok(Command::new("use", format!("use {}\r\n", tube), USING))
}

pub fn reserve() -> Command {
    Command::new("reserve", "reserve\r\n".to_string(), RESERVED)
}

/// `reserve-with-timeout <seconds>`; a timeout of 0 polls.
pub fn reserve_with_timeout(timeout: i64) -> BeanstalkResult<Command> {
    if timeout < 0 {
        return Err(BeanstalkError::InvalidArgument(format!(
            "timeout must not be negative, got {}",
            timeout
        )));
    }
    Ok(Command::new(
        "reserve-with-timeout",
        format!("reserve-with-timeout {}\r\n", timeout),
        RESERVED_OR_TIMEOUT,
    ))
}

pub fn delete(id: u64) -> Command {
    Command::new("delete", format!("delete {}\r\n", id), DELETED)
}

pub fn release(id: u64, priority: u32, delay: Duration) -> Command {
    Command::new(
        "release",
        format!("release {} {} {}\r\n", id, priority, delay.as_secs()),
        RELEASED,
    )
}

pub fn bury(id: u64, priority: u32) -> Command {
    Command::new("bury", format!("bury {} {}\r\n", id, priority), BURIED)
}

pub fn watch(tube: &str) -> BeanstalkResult<Command> {
    check_name(tube)?;
    Ok(Command::new("watch", format!("watch {}\r\n", tube), WATCHING))
}

pub fn ignore(tube: &str) -> BeanstalkResult<Command> {
    check_name(tube)?;
    Ok(Command::new("ignore", format!("ignore {}\r\n", tube), WATCHING))
}

pub fn peek(id: u64) -> Command {
    Command::new("peek", format!("peek {}\r\n", id), FOUND)
}

pub fn peek_ready() -> Command {
    Command::new("peek-ready", "peek-ready\r\n".to_string(), FOUND)
}

pub fn peek_delayed() -> Command {
    Command::new("peek-delayed", "peek-delayed\r\n".to_string(), FOUND)
}

pub fn peek_buried() -> Command {
    Command::new("peek-buried", "peek-buried\r\n".to_string(), FOUND)
}

/// Move at most `bound` jobs from the buried (or delayed) queue to ready.
pub fn kick(bound: u32) -> Command {
    Command::new("kick", format!("kick {}\r\n", bound), KICKED)
}

pub fn kick_job(id: u64) -> Command {
    Command::new("kick-job", format!("kick-job {}\r\n", id), KICKED_JOB)
}

pub fn touch(id: u64) -> Command {
    Command::new("touch", format!("touch {}\r\n", id), TOUCHED)
}

pub fn stats() -> Command {
    Command::new("stats", "stats\r\n".to_string(), YAML_OK)
}

pub fn stats_job(id: u64) -> Command {
    Command::new("stats-job", format!("stats-job {}\r\n", id), YAML_OK)
}

pub fn stats_tube(tube: &str) -> BeanstalkResult<Command> {
    check_name(tube)?;
    Ok(Command::new(
        "stats-tube",
        format!("stats-tube {}\r\n", tube),
        YAML_OK,
    ))
}

pub fn list_tubes() -> Command {
    Command::new("list-tubes", "list-tubes\r\n".to_string(), YAML_OK)
}

pub fn list_tube_used() -> Command {
    Command::new("list-tube-used", "list-tube-used\r\n".to_string(), USING)
}

pub fn list_tubes_watched() -> Command {
    Command::new(
        "list-tubes-watched",
        "list-tubes-watched\r\n".to_string(),
        YAML_OK,
    )
}

pub fn pause_tube(tube: &str, delay: Duration) -> BeanstalkResult<Command> {
    check_name(tube)?;
    Ok(Command::new(
        "pause-tube",
        format!("pause-tube {} {}\r\n", tube, delay.as_secs()),
        PAUSED,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{decode, Body, Decoded, FieldValue, Reply};

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    /// Frame `raw` the way the dispatcher does and decode it.
    fn answer(command: &Command, raw: &[u8]) -> Decoded {
        let end = raw.windows(2).position(|w| w == b"\r\n").unwrap() + 2;
        let mut reply = Reply::parse_line(&raw[..end]).unwrap();
        if end < raw.len() {
            reply.body = Some(raw[end..].to_vec());
        }
        decode(command.spec(), reply).unwrap()
    }

    fn yaml(text: &str) -> Body {
        Body::Yaml(serde_yaml::from_str(text).unwrap())
    }

    #[test]
    fn put() {
        let command = super::put(b"test_data", 0, secs(0), secs(10)).unwrap();
        assert_eq!(command.verb(), "put");
        assert_eq!(command.bytes(), b"put 0 0 10 9\r\ntest_data\r\n");

        let inserted = answer(&command, b"INSERTED 3\r\n");
        assert_eq!(inserted.state(), "ok");
        assert_eq!(inserted.int("jid"), Some(3));
        assert_eq!(inserted.fields().len(), 1);

        let buried = answer(&command, b"BURIED 3\r\n");
        assert_eq!(buried.state(), "buried");
        assert_eq!(buried.int("jid"), Some(3));
    }

    #[test]
    fn put_binary_body() {
        let body = [0u8, 159, 146, 150, b'\r', b'\n'];
        let command = super::put(&body, 5, secs(2), secs(120)).unwrap();
        let mut expected = b"put 5 2 120 6\r\n".to_vec();
        expected.extend_from_slice(&body);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(command.bytes(), &expected[..]);
    }

    #[test]
    fn put_rejects_large_jobs() {
        let body = vec![b'x'; MAX_JOB_SIZE];
        assert!(matches!(
            super::put(&body, 0, secs(0), secs(10)),
            Err(BeanstalkError::JobTooLarge { size: 65535, max: 65535 })
        ));
        assert!(super::put(&body[1..], 0, secs(0), secs(10)).is_ok());
    }

    #[test]
    fn use_tube() {
        let command = super::use_tube("bar").unwrap();
        assert_eq!(command.bytes(), b"use bar\r\n");
        let using = answer(&command, b"USING bar\r\n");
        assert_eq!(using.state(), "ok");
        assert_eq!(using.get("tube"), Some(&FieldValue::Str("bar".to_string())));
    }

    #[test]
    fn reserve() {
        let command = super::reserve();
        assert_eq!(command.bytes(), b"reserve\r\n");
        let reserved = answer(&command, b"RESERVED 12 5\r\nabcde\r\n");
        assert_eq!(reserved.state(), "ok");
        assert_eq!(reserved.int("jid"), Some(12));
        assert_eq!(reserved.int("bytes"), Some(5));
        assert_eq!(reserved.data(), Some(&Body::Raw(b"abcde".to_vec())));
    }

    #[test]
    fn reserve_with_timeout() {
        let command = super::reserve_with_timeout(4).unwrap();
        assert_eq!(command.bytes(), b"reserve-with-timeout 4\r\n");

        let reserved = answer(&command, b"RESERVED 12 5\r\nabcde\r\n");
        assert_eq!(reserved.int("jid"), Some(12));
        assert_eq!(reserved.data(), Some(&Body::Raw(b"abcde".to_vec())));

        let timeout = answer(&command, b"TIMED_OUT\r\n");
        assert_eq!(timeout.state(), "timeout");
        assert!(timeout.fields().is_empty());
        assert_eq!(timeout.data(), None);
    }

    #[test]
    fn reserve_with_negative_timeout() {
        assert!(matches!(
            super::reserve_with_timeout(-1),
            Err(BeanstalkError::InvalidArgument(_))
        ));
        assert!(super::reserve_with_timeout(0).is_ok());
    }

    #[test]
    fn delete() {
        let command = super::delete(12);
        assert_eq!(command.bytes(), b"delete 12\r\n");
        assert_eq!(answer(&command, b"DELETED\r\n").state(), "ok");
    }

    #[test]
    fn touch() {
        let command = super::touch(185);
        assert_eq!(command.bytes(), b"touch 185\r\n");
        assert_eq!(answer(&command, b"TOUCHED\r\n").state(), "ok");
    }

    #[test]
    fn release() {
        let command = super::release(33, 22, secs(17));
        assert_eq!(command.bytes(), b"release 33 22 17\r\n");
        assert_eq!(answer(&command, b"RELEASED\r\n").state(), "ok");
        assert_eq!(answer(&command, b"BURIED\r\n").state(), "buried");
    }

    #[test]
    fn bury() {
        let command = super::bury(29, 21);
        assert_eq!(command.bytes(), b"bury 29 21\r\n");
        assert_eq!(answer(&command, b"BURIED\r\n").state(), "ok");
    }

    #[test]
    fn watch_and_ignore() {
        let command = super::watch("supertube").unwrap();
        assert_eq!(command.bytes(), b"watch supertube\r\n");
        assert_eq!(answer(&command, b"WATCHING 5\r\n").int("count"), Some(5));

        let command = super::ignore("supertube").unwrap();
        assert_eq!(command.bytes(), b"ignore supertube\r\n");
        let watching = answer(&command, b"WATCHING 3\r\n");
        assert_eq!(watching.state(), "ok");
        assert_eq!(watching.int("count"), Some(3));
    }

    #[test]
    fn peek_family() {
        let command = super::peek(39);
        assert_eq!(command.bytes(), b"peek 39\r\n");
        let found = answer(&command, b"FOUND 39 10\r\nabcdefghij\r\n");
        assert_eq!(found.state(), "ok");
        assert_eq!(found.int("jid"), Some(39));
        assert_eq!(found.int("bytes"), Some(10));
        assert_eq!(found.data(), Some(&Body::Raw(b"abcdefghij".to_vec())));

        let variants = [
            (super::peek_ready(), &b"peek-ready\r\n"[..]),
            (super::peek_delayed(), &b"peek-delayed\r\n"[..]),
            (super::peek_buried(), &b"peek-buried\r\n"[..]),
        ];
        for (command, line) in variants.iter() {
            assert_eq!(command.bytes(), *line);
            let found = answer(command, b"FOUND 9 10\r\nabcdefghij\r\n");
            assert_eq!(found.int("jid"), Some(9));
            assert_eq!(found.data(), Some(&Body::Raw(b"abcdefghij".to_vec())));
        }
    }

    #[test]
    fn kick() {
        let command = super::kick(200);
        assert_eq!(command.bytes(), b"kick 200\r\n");
        let kicked = answer(&command, b"KICKED 59\r\n");
        assert_eq!(kicked.state(), "ok");
        assert_eq!(kicked.int("count"), Some(59));

        let command = super::kick_job(7);
        assert_eq!(command.bytes(), b"kick-job 7\r\n");
        assert_eq!(answer(&command, b"KICKED\r\n").state(), "ok");
    }

    #[test]
    fn stats_family() {
        let commands = [
            (super::stats(), &b"stats\r\n"[..]),
            (super::stats_tube("barbaz").unwrap(), &b"stats-tube barbaz\r\n"[..]),
            (super::stats_job(19), &b"stats-job 19\r\n"[..]),
        ];
        for (command, line) in commands.iter() {
            assert_eq!(command.bytes(), *line);
            let stats = answer(command, b"OK 15\r\n---\ntest: good\n\r\n");
            assert_eq!(stats.state(), "ok");
            assert_eq!(stats.int("bytes"), Some(15));
            assert_eq!(stats.data(), Some(&yaml("test: good")));
        }
    }

    #[test]
    fn list_tubes() {
        let commands = [
            (super::list_tubes(), &b"list-tubes\r\n"[..]),
            (super::list_tubes_watched(), &b"list-tubes-watched\r\n"[..]),
        ];
        for (command, line) in commands.iter() {
            assert_eq!(command.bytes(), *line);
            let tubes = answer(command, b"OK 20\r\n---\n- default\n- foo\n\r\n");
            assert_eq!(tubes.int("bytes"), Some(20));
            assert_eq!(tubes.data(), Some(&yaml("[default, foo]")));
            let names: Vec<String> = tubes.data_as().unwrap();
            assert_eq!(names, vec!["default", "foo"]);
        }
    }

    #[test]
    fn list_tube_used() {
        let command = super::list_tube_used();
        assert_eq!(command.bytes(), b"list-tube-used\r\n");
        assert_eq!(answer(&command, b"USING bar\r\n").str("tube"), Some("bar"));
    }

    #[test]
    fn pause_tube() {
        let command = super::pause_tube("jobs", secs(10)).unwrap();
        assert_eq!(command.bytes(), b"pause-tube jobs 10\r\n");
        assert_eq!(answer(&command, b"PAUSED\r\n").state(), "ok");
    }

    #[test]
    fn accepts_valid_names() {
        for name in ["xxx", "default", "a-b_c", "(tube);1.$+", "9"].iter() {
            assert!(check_name(name).is_ok(), "{}", name);
        }
        assert!(check_name(&"a".repeat(MAX_TUBE_NAME_LEN)).is_ok());
    }

    #[test]
    fn rejects_invalid_names() {
        let too_long = "a".repeat(MAX_TUBE_NAME_LEN + 1);
        for name in ["", "-bad", "_bad", "a/b", "^/_*^", "sp ace", "tab\t", &too_long[..]].iter() {
            assert!(
                matches!(check_name(name), Err(BeanstalkError::InvalidName(_))),
                "{}",
                name
            );
        }
        assert!(super::use_tube("a/b").is_err());
        assert!(super::watch("-bad").is_err());
        assert!(super::ignore("-bad").is_err());
        assert!(super::stats_tube("-bad").is_err());
        assert!(super::pause_tube("-bad", secs(1)).is_err());
    }
}
