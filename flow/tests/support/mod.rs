//! Minimal process implementations shared by the scenario tests. None of
//! these are part of the crate's public surface; they exist only to drive a
//! `Network` end to end.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;

use flow_core::context::CancellationToken;
use flow_core::error::PollError;
use flow_core::ip::InformationPacket;
use flow_core::port::{AnyPort, InputPort, OutputPort};
use flow_core::process::{next_process_id, Process, ProcessError, ProcessId};
use flow_core::value::DynValue;

/// Emits a fixed, finite list of items, one at a time, closing `out` when
/// exhausted. An optional delay runs between items.
pub struct Emitter<T> {
    id: ProcessId,
    out: Arc<OutputPort<T>>,
    items: Mutex<VecDeque<T>>,
    delay: Option<Duration>,
}

impl<T: Send + Sync + 'static> Emitter<T> {
    pub fn new(items: Vec<T>, delay: Option<Duration>) -> Self {
        Self {
            id: next_process_id(),
            out: Arc::new(OutputPort::new("out", "emitted items", true, 8)),
            items: Mutex::new(items.into()),
            delay,
        }
    }

    pub fn out(&self) -> Arc<OutputPort<T>> {
        self.out.clone()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Process for Emitter<T> {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.out.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            let next = self.items.lock().expect("emitter queue lock poisoned").pop_front();
            let Some(item) = next else { break };

            if let Some(delay) = self.delay {
                futures::select! {
                    () = ctx.cancelled().fuse() => return Ok(()),
                    () = compio::time::sleep(delay).fuse() => {}
                }
            }

            if self.out.send(ctx, InformationPacket::new(item)).await.is_err() {
                return Ok(());
            }
        }
        self.out.close();
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {
        self.out.close();
    }
}

/// Emits clones of one item forever, as fast as the consumer allows (or with
/// a fixed inter-item delay), until cancelled. Tracks how many it managed to
/// send in a shared counter the test can inspect afterwards.
pub struct RepeatEmitter<T> {
    id: ProcessId,
    out: Arc<OutputPort<T>>,
    item: T,
    delay: Option<Duration>,
    sent: Arc<AtomicUsize>,
}

impl<T: Clone + Send + Sync + 'static> RepeatEmitter<T> {
    pub fn new(item: T, delay: Option<Duration>, sent: Arc<AtomicUsize>) -> Self {
        Self {
            id: next_process_id(),
            out: Arc::new(OutputPort::new("out", "repeated item", true, 8)),
            item,
            delay,
            sent,
        }
    }

    pub fn out(&self) -> Arc<OutputPort<T>> {
        self.out.clone()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Process for RepeatEmitter<T> {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.out.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            if let Some(delay) = self.delay {
                futures::select! {
                    () = ctx.cancelled().fuse() => break,
                    () = compio::time::sleep(delay).fuse() => {}
                }
            }
            if self.out.send(ctx, InformationPacket::new(self.item.clone())).await.is_err() {
                break;
            }
            self.sent.fetch_add(1, Ordering::Relaxed);
        }
        self.out.close();
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {
        self.out.close();
    }
}

/// Maps every string it receives to uppercase and forwards it.
pub struct Uppercase {
    id: ProcessId,
    input: Arc<InputPort<String>>,
    out: Arc<OutputPort<String>>,
}

impl Uppercase {
    pub fn new() -> Self {
        Self {
            id: next_process_id(),
            input: Arc::new(InputPort::new("in", "text to transform", true, 1)),
            out: Arc::new(OutputPort::new("out", "uppercased text", true, 1)),
        }
    }

    pub fn input(&self) -> Arc<InputPort<String>> {
        self.input.clone()
    }

    pub fn out(&self) -> Arc<OutputPort<String>> {
        self.out.clone()
    }
}

#[async_trait]
impl Process for Uppercase {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.input.clone(), self.out.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            match self.input.receive(ctx).await {
                Ok(ip) => {
                    if let Some(text) = ip.into_data() {
                        if self.out.send(ctx, InformationPacket::new(text.to_uppercase())).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Err(PollError::EndOfStream) => break,
                Err(PollError::Cancelled) => return Ok(()),
            }
        }
        self.out.close();
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {
        self.out.close();
    }
}

/// Collects every item it receives, in arrival order, into a shared `Vec`.
pub struct Collector<T> {
    id: ProcessId,
    input: Arc<InputPort<T>>,
    collected: Arc<Mutex<Vec<T>>>,
}

impl<T: Send + Sync + 'static> Collector<T> {
    pub fn new(max_connections: usize, collected: Arc<Mutex<Vec<T>>>) -> Self {
        Self {
            id: next_process_id(),
            input: Arc::new(InputPort::new("in", "collected items", true, max_connections)),
            collected,
        }
    }

    pub fn input(&self) -> Arc<InputPort<T>> {
        self.input.clone()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Process for Collector<T> {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.input.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            match self.input.receive(ctx).await {
                Ok(ip) => {
                    if let Some(item) = ip.into_data() {
                        self.collected.lock().expect("collector lock poisoned").push(item);
                    }
                }
                Err(PollError::EndOfStream) => break,
                Err(PollError::Cancelled) => return Ok(()),
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {}
}

/// Like `Collector`, but sleeps `delay` after every item — used to apply
/// deliberate backpressure from the sink side.
pub struct SleepingCollector<T> {
    id: ProcessId,
    input: Arc<InputPort<T>>,
    delay: Duration,
    received: Arc<AtomicUsize>,
}

impl<T: Send + Sync + 'static> SleepingCollector<T> {
    pub fn new(delay: Duration, received: Arc<AtomicUsize>) -> Self {
        Self {
            id: next_process_id(),
            input: Arc::new(InputPort::new("in", "throttled sink", true, 1)),
            delay,
            received,
        }
    }

    pub fn input(&self) -> Arc<InputPort<T>> {
        self.input.clone()
    }
}

#[async_trait]
impl<T: Send + Sync + 'static> Process for SleepingCollector<T> {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.input.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            match self.input.receive(ctx).await {
                Ok(_ip) => {
                    self.received.fetch_add(1, Ordering::Relaxed);
                    futures::select! {
                        () = ctx.cancelled().fuse() => return Ok(()),
                        () = compio::time::sleep(self.delay).fuse() => {}
                    }
                }
                Err(PollError::EndOfStream) => break,
                Err(PollError::Cancelled) => return Ok(()),
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {}
}

/// Receives packets and fails once it has seen `fail_after` of them —
/// simulating a process whose own logic decides the flow cannot continue.
pub struct Failer {
    id: ProcessId,
    input: Arc<InputPort<u32>>,
    fail_after: usize,
    seen: usize,
}

impl Failer {
    pub fn new(fail_after: usize) -> Self {
        Self {
            id: next_process_id(),
            input: Arc::new(InputPort::new("in", "packets before failing", true, 1)),
            fail_after,
            seen: 0,
        }
    }

    pub fn input(&self) -> Arc<InputPort<u32>> {
        self.input.clone()
    }
}

#[async_trait]
impl Process for Failer {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.input.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            match self.input.receive(ctx).await {
                Ok(_ip) => {
                    self.seen += 1;
                    if self.seen >= self.fail_after {
                        return Err(ProcessError::Failed(format!("refusing to process past packet {}", self.seen)));
                    }
                }
                Err(PollError::EndOfStream) => return Ok(()),
                Err(PollError::Cancelled) => return Ok(()),
            }
        }
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {}
}

/// A sink whose only input is fed by an initial value rather than an edge:
/// overrides `deliver_initial_value` to push the delivered text through its
/// own port and into a collected list, exercising a `Network`'s IIP
/// delivery path end to end rather than `Process::deliver_initial_value`'s
/// rejecting default.
pub struct InitialValueSink {
    id: ProcessId,
    input: Arc<InputPort<String>>,
    collected: Arc<Mutex<Vec<String>>>,
}

impl InitialValueSink {
    pub fn new(collected: Arc<Mutex<Vec<String>>>) -> Self {
        Self { id: next_process_id(), input: Arc::new(InputPort::new("in", "initial value target", true, 1)), collected }
    }

    pub fn input(&self) -> Arc<InputPort<String>> {
        self.input.clone()
    }
}

#[async_trait]
impl Process for InitialValueSink {
    fn id(&self) -> ProcessId {
        self.id
    }

    fn ports(&self) -> Vec<Arc<dyn AnyPort>> {
        vec![self.input.clone()]
    }

    async fn initialize(&mut self, _ctx: &CancellationToken) -> Result<(), ProcessError> {
        Ok(())
    }

    async fn deliver_initial_value(&mut self, port: &str, value: DynValue, ctx: &CancellationToken) -> Result<(), ProcessError> {
        if port != "in" {
            return Err(ProcessError::UnknownInitialValueTarget { port: port.to_string() });
        }
        let text = value
            .as_text()
            .ok_or_else(|| ProcessError::InvalidInitialValue { port: port.to_string(), reason: "expected text".to_string() })?
            .to_string();
        self.input
            .deliver_initial_value(ctx, text)
            .await
            .map_err(|source| ProcessError::InvalidInitialValue { port: port.to_string(), reason: source.to_string() })
    }

    async fn run(&mut self, ctx: &CancellationToken) -> Result<(), ProcessError> {
        loop {
            match self.input.receive(ctx).await {
                Ok(ip) => {
                    if let Some(text) = ip.into_data() {
                        self.collected.lock().expect("sink lock poisoned").push(text);
                    }
                }
                Err(PollError::EndOfStream) => break,
                Err(PollError::Cancelled) => return Ok(()),
            }
        }
        Ok(())
    }

    async fn shutdown(&mut self, _ctx: &CancellationToken) {}
}
