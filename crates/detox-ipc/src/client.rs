//! Client side of the control socket

use detox_api::{Command, Event, Request, Response, ResponsePayload, ResponseResult};
use std::collections::VecDeque;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};

use crate::{IpcError, IpcResult};

/// A line from the daemon: a reply, or an event for a subscribed client
enum Incoming {
    Response(Response),
    Event(Event),
}

impl Incoming {
    fn parse(line: &str) -> IpcResult<Self> {
        let value: serde_json::Value = serde_json::from_str(line)?;
        if value.get("request_id").is_some() {
            Ok(Incoming::Response(serde_json::from_value(value)?))
        } else {
            Ok(Incoming::Event(serde_json::from_value(value)?))
        }
    }
}

async fn next_incoming(lines: &mut Lines<BufReader<OwnedReadHalf>>) -> IpcResult<Incoming> {
    loop {
        match lines.next_line().await? {
            None => return Err(IpcError::ConnectionClosed),
            Some(line) if line.trim().is_empty() => continue,
            Some(line) => return Incoming::parse(line.trim()),
        }
    }
}

/// Connection to detoxd
pub struct IpcClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    next_request_id: u64,
    /// Events that arrived while waiting for a reply
    pending_events: VecDeque<Event>,
}

impl IpcClient {
    pub async fn connect(socket_path: impl AsRef<Path>) -> IpcResult<Self> {
        let (read_half, writer) = UnixStream::connect(socket_path).await?.into_split();

        Ok(Self {
            lines: BufReader::new(read_half).lines(),
            writer,
            next_request_id: 1,
            pending_events: VecDeque::new(),
        })
    }

    /// Send a command and wait for its response.
    ///
    /// Events received in the meantime are kept for [`EventStream`].
    pub async fn send(&mut self, command: Command) -> IpcResult<Response> {
        let request_id = self.next_request_id;
        self.next_request_id += 1;

        let mut json = serde_json::to_string(&Request::new(request_id, command))?;
        json.push('\n');
        self.writer.write_all(json.as_bytes()).await?;

        loop {
            match next_incoming(&mut self.lines).await? {
                Incoming::Event(event) => self.pending_events.push_back(event),
                // Id 0 answers a line the server could not parse
                Incoming::Response(response)
                    if response.request_id == request_id || response.request_id == 0 =>
                {
                    return Ok(response);
                }
                Incoming::Response(response) => {
                    return Err(IpcError::InvalidMessage(format!(
                        "reply to request {} while waiting for {}",
                        response.request_id, request_id
                    )));
                }
            }
        }
    }

    /// Send a command; an error reply becomes [`IpcError::Rejected`]
    pub async fn call(&mut self, command: Command) -> IpcResult<ResponsePayload> {
        match self.send(command).await?.result {
            ResponseResult::Ok(payload) => Ok(payload),
            ResponseResult::Err(info) => Err(IpcError::Rejected(info)),
        }
    }

    /// Subscribe and turn the connection into an event stream
    pub async fn subscribe(mut self) -> IpcResult<EventStream> {
        self.call(Command::SubscribeEvents).await?;

        Ok(EventStream {
            lines: self.lines,
            buffered: self.pending_events,
        })
    }
}

/// Events pushed by detoxd to a subscribed connection
pub struct EventStream {
    lines: Lines<BufReader<OwnedReadHalf>>,
    buffered: VecDeque<Event>,
}

impl EventStream {
    pub async fn next(&mut self) -> IpcResult<Event> {
        if let Some(event) = self.buffered.pop_front() {
            return Ok(event);
        }

        loop {
            match next_incoming(&mut self.lines).await? {
                Incoming::Event(event) => return Ok(event),
                Incoming::Response(_) => continue,
            }
        }
    }
}
