//! Pooled client that multiplexes many calls over a fixed set of relays.
//!
//! Every relay is at any moment either *free* (ready to carry a new call)
//! or *occupied* by exactly one outstanding call, keyed by its sequence
//! number. Responses that arrive while the engine is looking for a free
//! relay are buffered until their caller collects them.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::marker::PhantomData;
use std::time::Duration;

use goridge_frame::Frame;
use goridge_relay::{select_ready, Readiness, Relay, RelayKind, TransportError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::call;
use crate::codec::{Codec, DecodeOptions};
use crate::error::{Result, RpcError};
use crate::sequence::SequenceCounter;

/// Default bound on buffered, uncollected responses.
pub const DEFAULT_RESPONSE_BUFFER_LIMIT: usize = 10_000;

/// Default number of ready relays reclaimed per acquisition pass.
pub const DEFAULT_FLUSH_LIMIT: usize = 10;

/// Tuning knobs for [`MultiRpc`].
#[derive(Debug, Clone)]
pub struct MultiRpcConfig {
    /// Once more responses than this are buffered, the next `call_async`
    /// drops every buffered response and forgets their sequences.
    pub response_buffer_limit: usize,
    /// Maximum number of ready relays reclaimed when no relay is free.
    pub flush_limit: usize,
    /// First non-zero readiness wait while collecting responses.
    pub poll_step: Duration,
    /// Ceiling for the readiness wait, which doubles on every idle round.
    pub max_poll_timeout: Duration,
}

impl Default for MultiRpcConfig {
    fn default() -> Self {
        Self {
            response_buffer_limit: DEFAULT_RESPONSE_BUFFER_LIMIT,
            flush_limit: DEFAULT_FLUSH_LIMIT,
            poll_step: Duration::from_micros(100),
            max_poll_timeout: Duration::from_millis(50),
        }
    }
}

impl MultiRpcConfig {
    fn next_timeout(&self, current: Duration) -> Duration {
        if current.is_zero() {
            self.poll_step
        } else {
            (current * 2).min(self.max_poll_timeout)
        }
    }
}

/// A response waiting for its caller.
enum Buffered {
    Frame { frame: Frame, relay: String },
    Failed(RpcError),
}

/// Pooled, asynchronous Goridge client.
///
/// Calls are submitted with [`call`](Self::call) (blocking),
/// [`call_ignore_response`](Self::call_ignore_response) or
/// [`call_async`](Self::call_async), whose responses are collected later
/// with [`get_response`](Self::get_response) or
/// [`get_responses`](Self::get_responses).
pub struct MultiRpc {
    free: Vec<Box<dyn Relay>>,
    occupied: BTreeMap<u32, Box<dyn Relay>>,
    /// Sequences somebody will collect.
    pending: HashSet<u32>,
    responses: HashMap<u32, Buffered>,
    kind: RelayKind,
    codec: Codec,
    prefix: Option<String>,
    config: MultiRpcConfig,
    sequence: SequenceCounter,
}

impl MultiRpc {
    /// Pool over `relays`, which must be non-empty and all of one kind.
    pub fn new(relays: Vec<Box<dyn Relay>>) -> Result<Self> {
        let Some(first) = relays.first() else {
            return Err(RpcError::Config(
                "a relay pool needs at least one relay".to_string(),
            ));
        };
        let kind = first.kind();
        if let Some(other) = relays.iter().find(|relay| relay.kind() != kind) {
            return Err(RpcError::Config(format!(
                "all relays must be of one kind, found {} and {}",
                kind.name(),
                other.kind().name()
            )));
        }

        Ok(Self {
            free: relays,
            occupied: BTreeMap::new(),
            pending: HashSet::new(),
            responses: HashMap::new(),
            kind,
            codec: Codec::default(),
            prefix: None,
            config: MultiRpcConfig::default(),
            sequence: SequenceCounter::new(),
        })
    }

    /// Pool of `count` relays opened from one connection string.
    pub fn create(connection: &str, count: usize) -> Result<Self> {
        if count == 0 {
            return Err(RpcError::Config(
                "a relay pool needs at least one relay".to_string(),
            ));
        }
        let relays = (0..count)
            .map(|_| goridge_relay::create(connection))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::new(relays)
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Prefix every method with `prefix.` (and title-case the method).
    pub fn with_service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn with_config(mut self, config: MultiRpcConfig) -> Self {
        self.config = config;
        self
    }

    /// Draw sequence numbers from a shared counter.
    pub fn with_sequence(mut self, sequence: SequenceCounter) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn service_prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn config(&self) -> &MultiRpcConfig {
        &self.config
    }

    pub fn sequence(&self) -> &SequenceCounter {
        &self.sequence
    }

    /// Kind shared by every relay in the pool.
    pub fn relay_kind(&self) -> RelayKind {
        self.kind
    }

    pub fn free_relays(&self) -> usize {
        self.free.len()
    }

    pub fn occupied_relays(&self) -> usize {
        self.occupied.len()
    }

    pub fn total_relays(&self) -> usize {
        self.free.len() + self.occupied.len()
    }

    /// Number of responses buffered and not yet collected.
    pub fn buffered_responses(&self) -> usize {
        self.responses.len()
    }

    /// A second pool with fresh handles to the same endpoints and the same
    /// settings. The two pools never share a relay, but they do share the
    /// sequence counter.
    pub fn duplicate(&self) -> Result<Self> {
        let relays = self
            .free
            .iter()
            .chain(self.occupied.values())
            .map(|relay| relay.duplicate())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut copy = Self::new(relays)?
            .with_codec(self.codec)
            .with_config(self.config.clone())
            .with_sequence(self.sequence.clone());
        copy.prefix = self.prefix.clone();
        Ok(copy)
    }

    /// Open the connection of every free relay now rather than on first use.
    pub fn pre_connect_relays(&mut self) -> Result<()> {
        for relay in &mut self.free {
            relay.connect()?;
        }
        Ok(())
    }

    /// Call `method` and block for its result.
    pub fn call<T, R>(&mut self, method: &str, payload: &T) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.call_with_options(method, payload, DecodeOptions::NONE)
    }

    /// Like [`call`](Self::call) with explicit decode options.
    pub fn call_with_options<T, R>(
        &mut self,
        method: &str,
        payload: &T,
        options: DecodeOptions,
    ) -> Result<R>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let (sequence, request) = self.request(method, payload)?;
        let mut relay = self.submit(&request)?;

        let received = self.wait_for_sequence(relay.as_mut(), sequence);
        let name = relay.to_string();
        self.free.push(relay);

        call::decode_response(&received?, &name, self.codec, options)
    }

    /// Send a call whose response nobody will collect.
    ///
    /// The relay stays occupied until the engine next needs one and finds
    /// the response waiting.
    pub fn call_ignore_response<T>(&mut self, method: &str, payload: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let (sequence, request) = self.request(method, payload)?;
        let relay = self.submit(&request)?;
        self.occupied.insert(sequence, relay);
        Ok(())
    }

    /// Send a call and return its sequence number for later collection.
    pub fn call_async<T>(&mut self, method: &str, payload: &T) -> Result<u32>
    where
        T: Serialize + ?Sized,
    {
        self.enforce_buffer_limit();

        let (sequence, request) = self.request(method, payload)?;
        let relay = self.submit(&request)?;
        self.occupied.insert(sequence, relay);
        self.pending.insert(sequence);
        Ok(sequence)
    }

    /// Whether the response for `sequence` can be collected without
    /// blocking. Never blocks.
    pub fn has_response(&self, sequence: u32) -> Result<bool> {
        if !self.pending.contains(&sequence) {
            return Err(RpcError::UnknownSequence(sequence));
        }
        if self.responses.contains_key(&sequence) {
            return Ok(true);
        }
        match self.occupied.get(&sequence) {
            // A failing check means the next read reports the failure at once.
            Some(relay) => Ok(relay.has_frame().unwrap_or(true)),
            None => Err(RpcError::UnknownSequence(sequence)),
        }
    }

    /// The subset of `sequences` whose responses can be collected without
    /// blocking, in the order given. Unknown sequences are skipped.
    pub fn has_responses(&self, sequences: &[u32]) -> Vec<u32> {
        let mut ready = HashSet::new();
        let mut waiting = Vec::new();

        for &sequence in sequences {
            if !self.pending.contains(&sequence) {
                continue;
            }
            if self.responses.contains_key(&sequence) {
                ready.insert(sequence);
            } else if self.occupied.contains_key(&sequence) {
                waiting.push(sequence);
            }
        }

        if !waiting.is_empty() {
            let relays: Vec<&dyn Relay> = waiting
                .iter()
                .filter_map(|sequence| self.occupied.get(sequence))
                .map(|relay| relay.as_ref())
                .collect();
            if self.kind.is_multiplexable() {
                match select_ready(&relays, Duration::ZERO) {
                    Ok(readiness) => {
                        ready.extend(readiness.into_positions().into_iter().map(|pos| waiting[pos]))
                    }
                    Err(err) => {
                        debug!(error = %err, "readiness check failed");
                        ready.extend(waiting.iter().copied());
                    }
                }
            } else {
                ready.extend(
                    waiting
                        .iter()
                        .zip(&relays)
                        .filter(|(_, relay)| relay.has_frame().unwrap_or(true))
                        .map(|(sequence, _)| *sequence),
                );
            }
        }

        let mut seen = HashSet::new();
        sequences
            .iter()
            .copied()
            .filter(|sequence| ready.contains(sequence) && seen.insert(*sequence))
            .collect()
    }

    /// Collect the response of an earlier [`call_async`](Self::call_async),
    /// blocking until it arrives.
    ///
    /// A sequence can be collected once; asking again fails with
    /// [`RpcError::UnknownSequence`].
    pub fn get_response<R: DeserializeOwned>(&mut self, sequence: u32) -> Result<R> {
        self.get_response_with_options(sequence, DecodeOptions::NONE)
    }

    /// Like [`get_response`](Self::get_response) with explicit decode
    /// options.
    pub fn get_response_with_options<R: DeserializeOwned>(
        &mut self,
        sequence: u32,
        options: DecodeOptions,
    ) -> Result<R> {
        if !self.pending.contains(&sequence) {
            return Err(RpcError::UnknownSequence(sequence));
        }
        if !self.responses.contains_key(&sequence) {
            self.reclaim(sequence);
        }
        self.take_response(sequence, options)
    }

    /// Collect several responses as they arrive, in completion order.
    ///
    /// Every sequence is validated first; an unknown or repeated one fails
    /// the whole request without touching any state. Sequences the
    /// iterator does not reach (because it was dropped early) remain
    /// collectable.
    pub fn get_responses<R: DeserializeOwned>(
        &mut self,
        sequences: &[u32],
    ) -> Result<Responses<'_, R>> {
        self.get_responses_with_options(sequences, DecodeOptions::NONE)
    }

    /// Like [`get_responses`](Self::get_responses) with explicit decode
    /// options.
    pub fn get_responses_with_options<R: DeserializeOwned>(
        &mut self,
        sequences: &[u32],
        options: DecodeOptions,
    ) -> Result<Responses<'_, R>> {
        let mut seen = HashSet::with_capacity(sequences.len());
        for &sequence in sequences {
            if !self.pending.contains(&sequence) || !seen.insert(sequence) {
                return Err(RpcError::UnknownSequence(sequence));
            }
        }

        Ok(Responses {
            rpc: self,
            remaining: sequences.to_vec(),
            options,
            timeout: Duration::ZERO,
            _marker: PhantomData,
        })
    }

    fn request<T: Serialize + ?Sized>(&self, method: &str, payload: &T) -> Result<(u32, Frame)> {
        let method = call::method_name(self.prefix.as_deref(), method);
        let sequence = self.sequence.next();
        let frame = call::build_request_frame(&method, payload, sequence, self.codec)?;
        trace!(method = %method, sequence, "submitting call");
        Ok((sequence, frame))
    }

    /// Acquire a relay and send `request` on it. On failure the relay goes
    /// back to the free list; it reconnects on its next use if it can.
    fn submit(&mut self, request: &Frame) -> Result<Box<dyn Relay>> {
        let mut relay = self.acquire()?;
        if let Err(err) = relay.send(request) {
            debug!(relay = %relay, error = %err, "send failed");
            self.free.push(relay);
            return Err(err.into());
        }
        Ok(relay)
    }

    fn acquire(&mut self) -> Result<Box<dyn Relay>> {
        loop {
            if let Some(relay) = self.free.pop() {
                return Ok(relay);
            }
            if self.occupied.is_empty() {
                return Err(RpcError::NoRelays);
            }
            self.flush_occupied();
        }
    }

    /// Free at least one occupied relay, blocking on the oldest if none
    /// has a response waiting.
    fn flush_occupied(&mut self) {
        let sequences: Vec<u32> = self.occupied.keys().copied().collect();
        let readiness = if self.kind.is_multiplexable() {
            let relays: Vec<&dyn Relay> = self.occupied.values().map(|relay| relay.as_ref()).collect();
            select_ready(&relays, Duration::ZERO)
        } else {
            Ok(Readiness::Empty)
        };

        match readiness {
            Ok(Readiness::Ready(positions)) => {
                for position in positions.into_iter().take(self.config.flush_limit) {
                    self.reclaim(sequences[position]);
                }
                return;
            }
            Ok(Readiness::Empty) => {}
            Err(err) => debug!(error = %err, "readiness check failed"),
        }

        if self.evict_dead() > 0 {
            return;
        }
        if let Some(&oldest) = sequences.first() {
            trace!(sequence = oldest, "blocking on oldest occupied relay");
            self.reclaim(oldest);
        }
    }

    /// Move every disconnected occupied relay back to the free list. Their
    /// calls fail with a transport error.
    fn evict_dead(&mut self) -> usize {
        let dead: Vec<u32> = self
            .occupied
            .iter()
            .filter(|(_, relay)| !relay.is_connected())
            .map(|(sequence, _)| *sequence)
            .collect();

        for &sequence in &dead {
            if let Some(mut relay) = self.occupied.remove(&sequence) {
                warn!(sequence, relay = %relay, "relay disconnected with a call in flight");
                let err = TransportError::Disconnected(relay.to_string());
                relay.close();
                self.buffer(sequence, Buffered::Failed(err.into()));
                self.free.push(relay);
            }
        }
        dead.len()
    }

    /// Read the response owed on `sequence`'s relay (blocking) and free the
    /// relay.
    fn reclaim(&mut self, sequence: u32) {
        let Some(mut relay) = self.occupied.remove(&sequence) else {
            return;
        };
        match self.wait_for_sequence(relay.as_mut(), sequence) {
            Ok(frame) => {
                let name = relay.to_string();
                trace!(sequence, relay = %name, "reclaimed relay");
                self.buffer(sequence, Buffered::Frame { frame, relay: name });
            }
            Err(err) => {
                debug!(sequence, relay = %relay, error = %err, "relay failed while reclaiming");
                self.buffer(sequence, Buffered::Failed(err));
            }
        }

        self.free.push(relay);
    }

    /// Read frames from `relay` until the one answering `sequence` arrives.
    ///
    /// Frames naming another call's sequence are buffered for their owner.
    /// A frame without a readable sequence desynchronizes the relay, which
    /// is closed.
    fn wait_for_sequence(&mut self, relay: &mut dyn Relay, sequence: u32) -> Result<Frame> {
        loop {
            let frame = relay.wait_frame()?;
            let got = match call::response_sequence(&frame) {
                Ok(got) => got,
                Err(err) => {
                    relay.close();
                    return Err(err);
                }
            };
            if got == sequence {
                return Ok(frame);
            }
            debug!(expected = sequence, got, relay = %relay, "buffering response of another call");
            let name = relay.to_string();
            self.buffer(got, Buffered::Frame { frame, relay: name });
        }
    }

    /// Keep `entry` if somebody will collect `sequence`, otherwise drop it.
    fn buffer(&mut self, sequence: u32, entry: Buffered) {
        if !self.pending.contains(&sequence) {
            match entry {
                Buffered::Frame { .. } => trace!(sequence, "discarding uncollected response"),
                Buffered::Failed(err) => {
                    warn!(sequence, error = %err, "discarding failed call nobody waits for")
                }
            }
            return;
        }
        self.responses.entry(sequence).or_insert(entry);
    }

    fn take_response<R: DeserializeOwned>(
        &mut self,
        sequence: u32,
        options: DecodeOptions,
    ) -> Result<R> {
        self.pending.remove(&sequence);
        match self.responses.remove(&sequence) {
            Some(Buffered::Frame { frame, relay }) => {
                call::decode_response(&frame, &relay, self.codec, options)
            }
            Some(Buffered::Failed(err)) => Err(err),
            None => Err(RpcError::UnknownSequence(sequence)),
        }
    }

    fn enforce_buffer_limit(&mut self) {
        if self.responses.len() <= self.config.response_buffer_limit {
            return;
        }
        warn!(
            buffered = self.responses.len(),
            limit = self.config.response_buffer_limit,
            "response buffer full, dropping uncollected responses"
        );
        self.responses.clear();
        let occupied = &self.occupied;
        self.pending.retain(|sequence| occupied.contains_key(sequence));
    }
}

impl fmt::Debug for MultiRpc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiRpc")
            .field("kind", &self.kind)
            .field("free", &self.free.len())
            .field("occupied", &self.occupied.len())
            .field("pending", &self.pending.len())
            .field("buffered", &self.responses.len())
            .field("codec", &self.codec)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Iterator returned by [`MultiRpc::get_responses`].
///
/// Yields `(sequence, result)` for each requested sequence, buffered ones
/// first, then in the order their relays become readable.
pub struct Responses<'a, R> {
    rpc: &'a mut MultiRpc,
    remaining: Vec<u32>,
    options: DecodeOptions,
    timeout: Duration,
    _marker: PhantomData<fn() -> R>,
}

impl<R> Responses<'_, R> {
    /// Sequences not yet yielded.
    pub fn remaining(&self) -> &[u32] {
        &self.remaining
    }

    /// Wait for at least one outstanding relay to become readable and
    /// reclaim the ready ones.
    fn wait_for_any(&mut self) {
        let rpc = &mut *self.rpc;
        let waiting: Vec<u32> = self
            .remaining
            .iter()
            .copied()
            .filter(|sequence| rpc.occupied.contains_key(sequence))
            .collect();
        let Some(&first) = waiting.first() else {
            return;
        };

        if !rpc.kind.is_multiplexable() {
            rpc.reclaim(first);
            return;
        }

        let readiness = {
            let relays: Vec<&dyn Relay> = waiting
                .iter()
                .filter_map(|sequence| rpc.occupied.get(sequence))
                .map(|relay| relay.as_ref())
                .collect();
            select_ready(&relays, self.timeout)
        };

        match readiness {
            Ok(Readiness::Ready(positions)) => {
                for position in positions {
                    rpc.reclaim(waiting[position]);
                }
                self.timeout = Duration::ZERO;
            }
            Ok(Readiness::Empty) => {
                self.timeout = rpc.config.next_timeout(self.timeout);
            }
            Err(err) => {
                debug!(error = %err, "readiness check failed, blocking on one relay");
                rpc.reclaim(first);
            }
        }
    }
}

impl<R: DeserializeOwned> Iterator for Responses<'_, R> {
    type Item = (u32, Result<R>);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.remaining.is_empty() {
                return None;
            }

            let buffered = self
                .remaining
                .iter()
                .position(|sequence| self.rpc.responses.contains_key(sequence));
            if let Some(index) = buffered {
                let sequence = self.remaining.remove(index);
                return Some((sequence, self.rpc.take_response(sequence, self.options)));
            }

            let outstanding = self
                .remaining
                .iter()
                .any(|sequence| self.rpc.occupied.contains_key(sequence));
            if !outstanding {
                // Neither buffered nor in flight: its response was dropped.
                let sequence = self.remaining.remove(0);
                self.rpc.pending.remove(&sequence);
                return Some((sequence, Err(RpcError::UnknownSequence(sequence))));
            }

            self.wait_for_any();
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining.len(), Some(self.remaining.len()))
    }
}
