//! In-memory doubles for the broker and the chat platform.
//!
//! Compiled only for tests and with the `test-utils` feature.

use async_trait::async_trait;
use parking_lot::Mutex;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use std::collections::HashSet;
use std::sync::Arc;

use crate::broker::{BrokerError, RawRecord, RecordSource};
use crate::chat::{ChatClient, ChatError, MessageHandle, Reaction, Resolution};

const TEST_TOPIC: &str = "modelprediction";

#[derive(Debug, Default)]
struct BrokerState {
    records: Vec<Vec<u8>>,
    committed: usize,
    commits: usize,
    max_uncommitted: usize,
    closed: usize,
}

/// A single-partition log with one committed offset, like a Kafka consumer
/// group on a one-partition topic.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    state: Arc<Mutex<BrokerState>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, payload: impl Into<Vec<u8>>) {
        self.state.lock().records.push(payload.into());
    }

    /// A fresh consumer starting at the committed offset.
    pub fn consumer(&self) -> MemoryRecordSource {
        let position = self.state.lock().committed;
        MemoryRecordSource {
            broker: self.clone(),
            position,
            fail_commits: false,
        }
    }

    pub fn committed_offset(&self) -> usize {
        self.state.lock().committed
    }

    pub fn commit_count(&self) -> usize {
        self.state.lock().commits
    }

    /// Largest number of delivered-but-uncommitted records seen.
    pub fn max_uncommitted(&self) -> usize {
        self.state.lock().max_uncommitted
    }

    pub fn close_count(&self) -> usize {
        self.state.lock().closed
    }
}

/// Consumer over a [`MemoryBroker`]. Returns end of stream once the log is
/// drained.
#[derive(Debug)]
pub struct MemoryRecordSource {
    broker: MemoryBroker,
    position: usize,
    fail_commits: bool,
}

impl MemoryRecordSource {
    /// Make every commit fail, as if the process died right before it.
    pub fn failing_commits(mut self) -> Self {
        self.fail_commits = true;
        self
    }
}

#[async_trait]
impl RecordSource for MemoryRecordSource {
    async fn next_record(&mut self) -> Result<Option<RawRecord>, BrokerError> {
        let mut state = self.broker.state.lock();
        let Some(payload) = state.records.get(self.position).cloned() else {
            return Ok(None);
        };
        let offset = self.position as i64;
        self.position += 1;
        let uncommitted = self.position - state.committed;
        state.max_uncommitted = state.max_uncommitted.max(uncommitted);
        Ok(Some(RawRecord {
            topic: TEST_TOPIC.to_string(),
            partition: 0,
            offset,
            payload: Some(payload),
        }))
    }

    async fn commit(&mut self) -> Result<(), BrokerError> {
        if self.fail_commits {
            return Err(BrokerError::Kafka(KafkaError::ConsumerCommit(
                RDKafkaErrorCode::BrokerTransportFailure,
            )));
        }
        let mut state = self.broker.state.lock();
        state.committed = self.position;
        state.commits += 1;
        Ok(())
    }

    async fn close(&mut self) {
        self.broker.state.lock().closed += 1;
    }
}

/// A call observed by [`RecordingChatClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCall {
    Resolve { channel_id: u64, message_id: u64 },
    Delete(MessageHandle),
    React(MessageHandle, Reaction),
}

#[derive(Debug, Default)]
struct ChatState {
    channels: HashSet<u64>,
    messages: HashSet<(u64, u64)>,
    calls: Vec<ChatCall>,
    action_failure: Option<u16>,
}

/// Chat platform double that records every call.
#[derive(Debug, Clone, Default)]
pub struct RecordingChatClient {
    state: Arc<Mutex<ChatState>>,
}

impl RecordingChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a message (and its channel) resolvable.
    pub fn with_message(self, channel_id: u64, message_id: u64) -> Self {
        {
            let mut state = self.state.lock();
            state.channels.insert(channel_id);
            state.messages.insert((channel_id, message_id));
        }
        self
    }

    /// Make a channel visible without any messages in it.
    pub fn with_channel(self, channel_id: u64) -> Self {
        self.state.lock().channels.insert(channel_id);
        self
    }

    /// Fail every delete/react with this HTTP status.
    pub fn failing_actions(self, status: u16) -> Self {
        self.state.lock().action_failure = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<ChatCall> {
        self.state.lock().calls.clone()
    }

    /// Calls other than resolve.
    pub fn actions(&self) -> Vec<ChatCall> {
        self.calls()
            .into_iter()
            .filter(|call| !matches!(call, ChatCall::Resolve { .. }))
            .collect()
    }

    fn action_result(state: &ChatState, route: String) -> Result<(), ChatError> {
        match state.action_failure {
            None => Ok(()),
            Some(429) => Err(ChatError::RateLimited {
                route,
                retry_after: 1.0,
                global: false,
            }),
            Some(status) => Err(ChatError::Http {
                route,
                status,
                code: 0,
                message: "simulated failure".into(),
            }),
        }
    }
}

#[async_trait]
impl ChatClient for RecordingChatClient {
    async fn resolve(&self, channel_id: u64, message_id: u64) -> Result<Resolution, ChatError> {
        let mut state = self.state.lock();
        state.calls.push(ChatCall::Resolve {
            channel_id,
            message_id,
        });
        if !state.channels.contains(&channel_id) {
            return Ok(Resolution::ChannelNotFound);
        }
        if !state.messages.contains(&(channel_id, message_id)) {
            return Ok(Resolution::MessageNotFound);
        }
        Ok(Resolution::Found(MessageHandle {
            channel_id,
            message_id,
        }))
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<(), ChatError> {
        let mut state = self.state.lock();
        state.calls.push(ChatCall::Delete(*handle));
        Self::action_result(&state, format!("DELETE message {}", handle.message_id))?;
        state.messages.remove(&(handle.channel_id, handle.message_id));
        Ok(())
    }

    async fn react(&self, handle: &MessageHandle, reaction: Reaction) -> Result<(), ChatError> {
        let mut state = self.state.lock();
        state.calls.push(ChatCall::React(*handle, reaction));
        Self::action_result(&state, format!("PUT reaction {}", handle.message_id))
    }
}
