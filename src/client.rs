//! The single logical thread of control.
//!
//! One task owns the phase state store, the panel machine, and the event log.
//! It selects over the inbound session feed, the 1 Hz countdown tick, and UI
//! commands, so every mutation is serialized on one loop and race-free by
//! construction. The render layer only ever sees cloned [`ClientView`]
//! snapshots through a watch channel.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::game_log::EventLog;
use crate::panel::{ActionPanel, PanelMachine};
use crate::protocol::events::Teammate;
use crate::session::{ConnectionHandle, SessionEvent};
use crate::state::{GameState, PhaseStateStore, PlayerId, Role, Seat};

const LOG_TARGET: &str = "client";

/// Commands the render layer may issue. Each is validated locally; a policy
/// violation is logged at debug level and never reaches the server.
#[derive(Clone, Debug)]
pub enum ClientCommand {
    Select(PlayerId),
    WitchSave,
    WitchPoison(PlayerId),
    Confirm,
    StartGame,
    TakeSeat(Seat),
    ReadyToggle,
    WithdrawCandidacy,
}

/// Everything the render layer needs, as one cheap snapshot.
#[derive(Clone, Debug, Default)]
pub struct ClientView {
    pub state: Option<GameState>,
    pub my_role: Option<Role>,
    pub teammates: Vec<Teammate>,
    pub panel: ActionPanel,
    pub log: Vec<String>,
    pub remaining_secs: u64,
    pub connected: bool,
}

pub struct GameClient {
    store: PhaseStateStore,
    panels: PanelMachine,
    log: EventLog,
    connection: ConnectionHandle,
    inbound: mpsc::Receiver<SessionEvent>,
    commands: mpsc::Receiver<ClientCommand>,
    countdown: watch::Receiver<u64>,
    view: watch::Sender<ClientView>,
    cancel: CancellationToken,
    connected: bool,
}

/// Control surface for a spawned client. Dropping it stops the loop.
pub struct GameClientHandle {
    commands: mpsc::Sender<ClientCommand>,
    view: watch::Receiver<ClientView>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl GameClient {
    /// Wires a client onto an open connection and spawns its event loop.
    pub fn spawn(
        local_player_id: PlayerId,
        inbound: mpsc::Receiver<SessionEvent>,
        connection: ConnectionHandle,
        command_capacity: usize,
    ) -> GameClientHandle {
        let (store, countdown) = PhaseStateStore::new(local_player_id);
        let (commands_tx, commands_rx) = mpsc::channel(command_capacity);
        let (view_tx, view_rx) = watch::channel(ClientView::default());
        let cancel = CancellationToken::new();

        let client = GameClient {
            store,
            panels: PanelMachine::new(),
            log: EventLog::new(),
            connection,
            inbound,
            commands: commands_rx,
            countdown,
            view: view_tx,
            cancel: cancel.clone(),
            connected: false,
        };
        let task = tokio::spawn(client.run());

        GameClientHandle {
            commands: commands_tx,
            view: view_rx,
            cancel,
            task: Some(task),
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    // release the transport; no intent may follow
                    self.connection.close();
                    break;
                }
                event = self.inbound.recv() => match event {
                    Some(event) => {
                        let finished = self.on_session_event(event);
                        self.publish();
                        if finished {
                            break;
                        }
                    }
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(command) => {
                        self.on_command(command).await;
                        self.publish();
                    }
                    // the UI handle is gone; nothing can drive us anymore
                    None => break,
                },
                changed = self.countdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.publish();
                }
            }
        }
        self.publish();
    }

    /// Fan-out: store always, panel machine for grants and resets, log for
    /// narrative. Returns true when the connection is finished.
    fn on_session_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Opened => {
                // fresh connection: the server re-delivers a full snapshot,
                // so everything local starts over, log included
                self.store.reset();
                self.panels = PanelMachine::new();
                self.log = EventLog::new();
                self.connected = true;
                false
            }
            SessionEvent::Event(event) => {
                self.store.apply(&event);
                self.panels.on_event(&event, &self.store);
                self.log.project(&event, self.store.state());
                false
            }
            SessionEvent::Error(err) => {
                warn!(target = LOG_TARGET, error = %err, "transport error");
                self.log.note(format!("Connection error: {err}."));
                false
            }
            SessionEvent::Closed { reason } => {
                self.connected = false;
                match reason {
                    Some(reason) => self.log.note(format!("Disconnected: {reason}.")),
                    None => self.log.note("Disconnected from the server."),
                }
                true
            }
        }
    }

    async fn on_command(&mut self, command: ClientCommand) {
        let outcome = match command {
            ClientCommand::Select(target) => {
                let result = self.panels.select(target, &self.store);
                self.reject_if_err(result);
                return;
            }
            ClientCommand::WitchSave => {
                let result = self.panels.select_save(&self.store);
                self.reject_if_err(result);
                return;
            }
            ClientCommand::WitchPoison(target) => {
                let result = self.panels.select_poison(target, &self.store);
                self.reject_if_err(result);
                return;
            }
            ClientCommand::Confirm => self.panels.confirm(&self.store),
            ClientCommand::StartGame => self.panels.start_game(&self.store),
            ClientCommand::TakeSeat(seat) => self.panels.take_seat(seat, &self.store),
            ClientCommand::ReadyToggle => self.panels.ready_toggle(&self.store),
            ClientCommand::WithdrawCandidacy => self.panels.withdraw_candidacy(&self.store),
        };

        match outcome {
            Ok(intent) => {
                debug!(target = LOG_TARGET, ?intent, "sending intent");
                if let Err(err) = self.connection.send(intent).await {
                    warn!(target = LOG_TARGET, error = %err, "intent could not be sent");
                    self.log.note(format!("Connection error: {err}."));
                }
            }
            Err(violation) => {
                debug!(target = LOG_TARGET, %violation, "command rejected locally");
            }
        }
    }

    fn reject_if_err(&self, result: Result<(), crate::error::LocalPolicyViolation>) {
        if let Err(violation) = result {
            debug!(target = LOG_TARGET, %violation, "selection rejected locally");
        }
    }

    fn publish(&self) {
        let view = ClientView {
            state: self.store.state().cloned(),
            my_role: self.store.my_role().cloned(),
            teammates: self.store.teammates().to_vec(),
            panel: self.panels.active_panel(&self.store),
            log: self.log.lines().to_vec(),
            remaining_secs: *self.countdown.borrow(),
            connected: self.connected,
        };
        let _ = self.view.send(view);
    }
}

impl GameClientHandle {
    pub fn view(&self) -> watch::Receiver<ClientView> {
        self.view.clone()
    }

    /// Queues a command for the client loop. Returns false once the loop has
    /// stopped.
    pub async fn command(&self, command: ClientCommand) -> bool {
        self.commands.send(command).await.is_ok()
    }

    /// Stops the loop; the transport is released before it exits.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Waits for the loop to finish.
    pub async fn join(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for GameClientHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::{PhaseChangePayload, ServerEvent};
    use crate::protocol::intents::ClientIntent;
    use crate::state::{Phase, Player};
    use std::time::Duration;
    use tokio::time::timeout;

    fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            profile_id: format!("profile-{id}"),
            name: id.to_uppercase(),
            avatar_url: None,
            seat: Some(if id == "a" { 1 } else { 2 }),
            is_alive: true,
            role: None,
            is_sheriff: false,
            is_host: false,
            is_ready: false,
        }
    }

    fn snapshot() -> GameState {
        GameState {
            room_id: "room-1".to_string(),
            players: vec![player("a"), player("b")],
            phase: Phase::DayDiscussion,
            day: 1,
            host_id: "profile-a".to_string(),
            phase_end_time: None,
            sheriff_candidates: Vec::new(),
            current_speaker_id: None,
            nightly_deaths: Vec::new(),
            winner: None,
            game_config: None,
        }
    }

    async fn wait_for<F: Fn(&ClientView) -> bool>(
        view: &mut watch::Receiver<ClientView>,
        predicate: F,
    ) {
        if predicate(&view.borrow()) {
            return;
        }
        loop {
            timeout(Duration::from_secs(2), view.changed())
                .await
                .expect("view timed out")
                .expect("view sender dropped");
            if predicate(&view.borrow()) {
                return;
            }
        }
    }

    #[tokio::test]
    async fn voting_flow_emits_exactly_one_intent() {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (handle, mut outbound_rx) = ConnectionHandle::test_pair(16);
        let client = GameClient::spawn("a".to_string(), inbound_rx, handle, 16);
        let mut view = client.view();

        inbound_tx.send(SessionEvent::Opened).await.unwrap();
        inbound_tx
            .send(SessionEvent::Event(ServerEvent::GameStart { room: snapshot() }))
            .await
            .unwrap();
        inbound_tx
            .send(SessionEvent::Event(ServerEvent::PhaseChange(
                PhaseChangePayload {
                    phase: Phase::Voting,
                    day: Some(1),
                    phase_end_time: None,
                    deaths: Vec::new(),
                },
            )))
            .await
            .unwrap();

        wait_for(&mut view, |v| v.panel == ActionPanel::Vote).await;

        assert!(client.command(ClientCommand::Select("b".to_string())).await);
        assert!(client.command(ClientCommand::Confirm).await);

        let intent = timeout(Duration::from_secs(2), outbound_rx.recv())
            .await
            .expect("no intent emitted")
            .expect("outbound closed");
        assert_eq!(
            intent,
            ClientIntent::VotePlayer {
                target_player_id: "b".to_string()
            }
        );

        // the action is spent; a second confirm changes nothing
        assert!(client.command(ClientCommand::Confirm).await);
        wait_for(&mut view, |v| v.panel == ActionPanel::NoPanel).await;
        assert!(outbound_rx.try_recv().is_err());

        client.close();
        client.join().await;
    }

    #[tokio::test]
    async fn closed_connection_finishes_the_loop() {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (handle, _outbound_rx) = ConnectionHandle::test_pair(16);
        let client = GameClient::spawn("a".to_string(), inbound_rx, handle, 16);
        let mut view = client.view();

        inbound_tx.send(SessionEvent::Opened).await.unwrap();
        wait_for(&mut view, |v| v.connected).await;

        inbound_tx
            .send(SessionEvent::Closed { reason: None })
            .await
            .unwrap();
        wait_for(&mut view, |v| !v.connected).await;
        assert!(view
            .borrow()
            .log
            .iter()
            .any(|line| line.contains("Disconnected")));
        client.join().await;
    }

    #[tokio::test]
    async fn reconnect_starts_from_a_clean_slate() {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (handle, _outbound_rx) = ConnectionHandle::test_pair(16);
        let client = GameClient::spawn("a".to_string(), inbound_rx, handle, 16);
        let mut view = client.view();

        inbound_tx.send(SessionEvent::Opened).await.unwrap();
        inbound_tx
            .send(SessionEvent::Event(ServerEvent::GameStart { room: snapshot() }))
            .await
            .unwrap();
        wait_for(&mut view, |v| v.state.is_some()).await;

        // a second Opened (remount) rebuilds everything from scratch
        inbound_tx.send(SessionEvent::Opened).await.unwrap();
        wait_for(&mut view, |v| v.state.is_none() && v.log.is_empty()).await;
        client.close();
        client.join().await;
    }
}
