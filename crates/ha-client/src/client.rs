//! The protocol client: handshake, frame loop, commands and listeners

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use futures::{Sink, SinkExt, Stream, StreamExt};
use ha_core::events::StateChangedData;
use ha_core::{Event, EventType, ServiceCall, State};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace, warn};

use crate::codec::{self, Command, IncomingMessage};
use crate::config::ConnectOptions;
use crate::correlation::PendingCommands;
use crate::error::{ClientError, ClientResult};
use crate::subscriptions::{Subscription, SubscriptionRegistry, TypedSubscription};

/// Capacity of the outgoing frame queue
const OUTGOING_QUEUE: usize = 256;

/// Handle to an authenticated hub connection
///
/// Cheap to clone; all clones share the connection. The command id sequence
/// belongs to the connection, so two clients never share id space. Dropping
/// the last clone closes the connection.
#[derive(Clone)]
pub struct HassClient {
    inner: Arc<Inner>,
}

struct Inner {
    outgoing: mpsc::Sender<Message>,
    pending: PendingCommands,
    subscriptions: SubscriptionRegistry,
    connected: AtomicBool,
    closed_tx: watch::Sender<bool>,
    ha_version: Option<String>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl HassClient {
    /// Open the websocket described by `options` and authenticate
    pub async fn connect(options: ConnectOptions) -> ClientResult<Self> {
        let url = options.websocket_url();
        info!(url = %url, "Connecting to Home Assistant");

        let (stream, _) = timeout(options.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ClientError::Connection(format!("timed out connecting to {}", url)))?
            .map_err(|e| ClientError::Connection(format!("{}: {}", url, e)))?;

        Self::from_stream(stream, &options).await
    }

    /// Authenticate over an already open websocket and start the frame loop
    pub async fn from_stream<S>(stream: S, options: &ConnectOptions) -> ClientResult<Self>
    where
        S: Stream<Item = Result<Message, WsError>>
            + Sink<Message, Error = WsError>
            + Unpin
            + Send
            + 'static,
    {
        let (mut write, mut read) = stream.split();

        let ha_version = timeout(
            options.handshake_timeout,
            authenticate(&mut write, &mut read, options.usable_token()),
        )
        .await
        .map_err(|_| ClientError::Connection("timed out during authentication".to_string()))??;

        info!(ha_version = ?ha_version, "Connected to Home Assistant");

        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE);
        let (closed_tx, closed_rx) = watch::channel(false);

        let inner = Arc::new(Inner {
            outgoing,
            pending: PendingCommands::new(),
            subscriptions: SubscriptionRegistry::new(options.channel_capacity),
            connected: AtomicBool::new(true),
            closed_tx,
            ha_version,
            reader: Mutex::new(None),
        });

        // The frame loops hold weak references so the last client handle owns the connection
        tokio::spawn(write_loop(Arc::downgrade(&inner), write, outgoing_rx, closed_rx));
        let reader = tokio::spawn(read_loop(Arc::downgrade(&inner), read));
        if let Ok(mut slot) = inner.reader.lock() {
            *slot = Some(reader);
        }

        Ok(Self { inner })
    }

    /// Whether the connection is still usable
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The hub version reported during the handshake
    pub fn ha_version(&self) -> Option<&str> {
        self.inner.ha_version.as_deref()
    }

    /// Number of commands still waiting for a result
    pub fn pending_commands(&self) -> usize {
        self.inner.pending.len()
    }

    /// Send a command and wait for its correlated result
    pub async fn send_command(&self, command: Command) -> ClientResult<Value> {
        let (_, rx) = self.start_command(&command).await?;
        await_outcome(rx).await
    }

    /// Put a command on the wire; returns its id and the receiver for its result
    async fn start_command(
        &self,
        command: &Command,
    ) -> ClientResult<(u64, oneshot::Receiver<ClientResult<Value>>)> {
        self.start_command_with(command, |_| {}).await
    }

    /// [`start_command`](Self::start_command), running `before_send` with the
    /// id once it is assigned and before the frame is queued
    async fn start_command_with(
        &self,
        command: &Command,
        before_send: impl FnOnce(u64),
    ) -> ClientResult<(u64, oneshot::Receiver<ClientResult<Value>>)> {
        if !self.is_connected() {
            return Err(ClientError::ConnectionLost("client is closed".to_string()));
        }

        let (id, rx) = self.inner.pending.register();

        // A shutdown racing with register() has already drained the table
        if !self.is_connected() {
            self.inner.pending.forget(id);
            return Err(ClientError::ConnectionLost("client is closed".to_string()));
        }

        let text = match codec::encode_command(id, command) {
            Ok(text) => text,
            Err(e) => {
                self.inner.pending.forget(id);
                return Err(e);
            }
        };

        before_send(id);
        debug!(id, command = command.kind(), "Sending command");
        if self.inner.outgoing.send(Message::Text(text)).await.is_err() {
            self.inner.pending.forget(id);
            return Err(ClientError::ConnectionLost(
                "writer task has stopped".to_string(),
            ));
        }

        Ok((id, rx))
    }

    /// Listen to events of `event_type`
    ///
    /// The first listener for a type subscribes on the hub; later ones reuse
    /// that subscription. `"*"` listens to every event.
    pub async fn add_event_listener(
        &self,
        event_type: impl Into<EventType>,
    ) -> ClientResult<Subscription> {
        let event_type = event_type.into();

        // Open the local stream first so nothing fired right after the
        // subscribe result is missed
        let receiver = self.inner.subscriptions.stream(&event_type);

        let wire_type = (!event_type.is_match_all()).then(|| event_type.to_string());
        let route_type = event_type.clone();
        let subscriptions = &self.inner.subscriptions;
        subscriptions
            .ensure_subscribed(&event_type, move || async move {
                let command = Command::SubscribeEvents {
                    event_type: wire_type,
                };
                // The hub identifies a subscription by the id of the command
                // that made it and tags every event frame with that id
                let (id, rx) = self
                    .start_command_with(&command, |id| subscriptions.route(id, &route_type))
                    .await?;
                match await_outcome(rx).await {
                    Ok(_) => Ok::<u64, ClientError>(id),
                    Err(e) => {
                        subscriptions.unroute(id);
                        Err(e)
                    }
                }
            })
            .await?;

        Ok(Subscription::new(event_type, receiver))
    }

    /// Callback form of [`add_event_listener`](Self::add_event_listener)
    ///
    /// Events are delivered in order on a dedicated task until the stream ends
    /// or the returned handle is detached.
    pub async fn on<F>(
        &self,
        event_type: impl Into<EventType>,
        callback: F,
    ) -> ClientResult<ListenerHandle>
    where
        F: Fn(Event<Value>) + Send + 'static,
    {
        let mut subscription = self.add_event_listener(event_type).await?;
        let event_type = subscription.event_type().clone();

        let task = tokio::spawn(async move {
            while let Some(event) = subscription.recv().await {
                callback(event);
            }
            trace!(event_type = %subscription.event_type(), "Listener stream ended");
        });

        Ok(ListenerHandle { event_type, task })
    }

    /// Listen to every event the hub fires
    pub async fn on_any_event(&self) -> ClientResult<Subscription> {
        self.add_event_listener(EventType::match_all()).await
    }

    /// Typed stream of `state_changed` events
    pub async fn on_state_changed(&self) -> ClientResult<TypedSubscription<StateChangedData>> {
        Ok(self
            .add_event_listener(ha_core::events::STATE_CHANGED)
            .await?
            .typed())
    }

    /// Drop the hub subscription for `event_type`
    ///
    /// Local streams for the type end. Missing subscriptions and failed
    /// `unsubscribe_events` commands are logged, not returned.
    pub async fn remove_event_listener(&self, event_type: impl Into<EventType>) {
        let event_type = event_type.into();
        let Some(subscription) = self.inner.subscriptions.take(&event_type).await else {
            warn!(event_type = %event_type, "No subscription to remove");
            return;
        };

        let Some(handle) = subscription.handle else {
            debug!(event_type = %event_type, "Subscription handle unknown, nothing to unsubscribe");
            return;
        };

        match self
            .send_command(Command::UnsubscribeEvents {
                subscription: handle,
            })
            .await
        {
            Ok(_) => debug!(event_type = %event_type, handle, "Unsubscribed from events"),
            Err(e) => warn!(event_type = %event_type, handle, error = %e, "Failed to unsubscribe"),
        }
    }

    /// Run `domain.service` with `service_data`
    pub async fn call_service(
        &self,
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: Value,
    ) -> ClientResult<()> {
        self.call(ServiceCall::new(domain, service, service_data))
            .await
    }

    /// Run a prepared [`ServiceCall`]
    pub async fn call(&self, call: ServiceCall) -> ClientResult<()> {
        self.send_command(Command::CallService {
            domain: call.domain,
            service: call.service,
            service_data: call.service_data,
        })
        .await?;
        Ok(())
    }

    /// Snapshot of every entity
    pub async fn get_states(&self) -> ClientResult<Vec<State>> {
        let result = self.send_command(Command::GetStates).await?;
        Ok(serde_json::from_value(result)?)
    }

    pub async fn get_services(&self) -> ClientResult<Value> {
        self.send_command(Command::GetServices).await
    }

    pub async fn get_config(&self) -> ClientResult<Value> {
        self.send_command(Command::GetConfig).await
    }

    pub async fn get_panels(&self) -> ClientResult<Value> {
        self.send_command(Command::GetPanels).await
    }

    /// Round trip a `ping`
    pub async fn ping(&self) -> ClientResult<()> {
        self.send_command(Command::Ping).await?;
        Ok(())
    }

    /// Close the connection
    ///
    /// Pending commands fail with [`ClientError::ConnectionLost`] and all
    /// listener streams end.
    pub async fn close(&self) {
        if !self.is_connected() {
            return;
        }
        let _ = self.inner.outgoing.send(Message::Close(None)).await;
        self.inner.shutdown("closed by client");
        if let Ok(mut slot) = self.inner.reader.lock() {
            if let Some(reader) = slot.take() {
                reader.abort();
            }
        }
    }
}

impl Inner {
    fn handle_frame(&self, text: &str) {
        match codec::decode(text) {
            Ok(IncomingMessage::Result(frame)) => {
                trace!(id = frame.id, success = frame.success, "Result frame");
                self.pending.resolve(frame);
            }
            Ok(IncomingMessage::Pong { id }) => {
                self.pending.resolve_pong(id);
            }
            Ok(IncomingMessage::Event(frame)) => {
                trace!(subscription = ?frame.id, event_type = %frame.event.event_type, "Event frame");
                self.subscriptions.dispatch(frame.id, frame.event);
            }
            Ok(other) => debug!(frame = ?other, "Ignoring frame"),
            Err(e) => warn!(error = %e, "Dropping undecodable frame"),
        }
    }

    /// Mark the connection dead, fail pending commands and end streams
    fn shutdown(&self, reason: &str) {
        if self.connected.swap(false, Ordering::SeqCst) {
            info!(reason, "Connection to Home Assistant terminated");
        }
        let failed = self.pending.fail_all(reason);
        if failed > 0 {
            warn!(failed, reason, "Rejected pending commands");
        }
        self.subscriptions.close();
        let _ = self.closed_tx.send(true);
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        debug!("Last client handle dropped, closing connection");
        if let Ok(slot) = self.reader.get_mut() {
            if let Some(reader) = slot.take() {
                reader.abort();
            }
        }
    }
}

/// Handle for a callback registered with [`HassClient::on`]
pub struct ListenerHandle {
    event_type: EventType,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Stop delivering events to the callback
    pub fn detach(self) {
        debug!(event_type = %self.event_type, "Detaching callback listener");
        self.task.abort();
    }

    pub fn is_attached(&self) -> bool {
        !self.task.is_finished()
    }
}

async fn await_outcome(rx: oneshot::Receiver<ClientResult<Value>>) -> ClientResult<Value> {
    rx.await.unwrap_or_else(|_| {
        Err(ClientError::ConnectionLost(
            "command was dropped without a result".to_string(),
        ))
    })
}

/// Run the auth state machine; returns the hub version
async fn authenticate<W, R>(
    write: &mut W,
    read: &mut R,
    token: Option<&str>,
) -> ClientResult<Option<String>>
where
    W: Sink<Message, Error = WsError> + Unpin,
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    match next_frame(read).await? {
        IncomingMessage::AuthOk { ha_version } => {
            debug!("Hub did not ask for authentication");
            Ok(ha_version)
        }
        IncomingMessage::AuthRequired { .. } => {
            let token = token.ok_or_else(|| ClientError::Auth("no token provided".to_string()))?;
            write.send(Message::Text(codec::encode_auth(token)?)).await?;

            match next_frame(read).await? {
                IncomingMessage::AuthOk { ha_version } => Ok(ha_version),
                IncomingMessage::AuthInvalid { message } => Err(ClientError::Auth(
                    message.unwrap_or_else(|| "invalid access token".to_string()),
                )),
                other => Err(ClientError::Protocol(format!(
                    "unexpected frame during authentication: {:?}",
                    other
                ))),
            }
        }
        IncomingMessage::AuthInvalid { message } => Err(ClientError::Auth(
            message.unwrap_or_else(|| "rejected before authentication".to_string()),
        )),
        other => Err(ClientError::Protocol(format!(
            "expected auth_required or auth_ok, got {:?}",
            other
        ))),
    }
}

/// Next decoded text frame during the handshake
async fn next_frame<R>(read: &mut R) -> ClientResult<IncomingMessage>
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => return codec::decode(&text),
            Some(Ok(Message::Close(frame))) => {
                return Err(ClientError::Connection(format!(
                    "hub closed the connection during the handshake: {:?}",
                    frame
                )))
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => {
                return Err(ClientError::Connection(
                    "connection ended during the handshake".to_string(),
                ))
            }
        }
    }
}

async fn read_loop<R>(inner: Weak<Inner>, mut read: R)
where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let reason = loop {
        let frame = read.next().await;
        let Some(live) = inner.upgrade() else {
            trace!("Client dropped, reader stopping");
            return;
        };
        match frame {
            Some(Ok(Message::Text(text))) => live.handle_frame(&text),
            Some(Ok(Message::Close(frame))) => {
                break format!("hub closed the connection: {:?}", frame)
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("websocket error: {}", e),
            None => break "websocket stream ended".to_string(),
        }
    };
    if let Some(live) = inner.upgrade() {
        live.shutdown(&reason);
    }
}

async fn write_loop<W>(
    inner: Weak<Inner>,
    mut write: W,
    mut outgoing: mpsc::Receiver<Message>,
    mut closed: watch::Receiver<bool>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            message = outgoing.recv() => {
                let Some(message) = message else { break };
                let closing = matches!(message, Message::Close(_));
                if let Err(e) = write.send(message).await {
                    if let Some(live) = inner.upgrade() {
                        live.shutdown(&format!("failed to write frame: {}", e));
                    }
                    break;
                }
                if closing {
                    break;
                }
            }
            // Also resolves once the last client handle drops the sender
            _ = closed.changed() => break,
        }
    }
    let _ = write.close().await;
}
