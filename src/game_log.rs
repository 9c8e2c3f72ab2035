//! Projects inbound events into the human-readable game log.
//!
//! Append-only and arrival-ordered. Each loggable event type has exactly one
//! formatting rule; unrecognized envelopes still leave a generic trace. Panel
//! grants are UI state, not narrative, and never appear here. Reconnecting
//! starts a fresh log; there is no history replay.

use crate::protocol::events::ServerEvent;
use crate::state::{GameState, PlayerId, Winner};

pub struct EventLog {
    lines: Vec<String>,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl EventLog {
    pub fn new() -> Self {
        Self { lines: Vec::new() }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// A client-side line (transport errors, disconnects noticed locally).
    pub fn note(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Projects one inbound event. `state` is the snapshot after the event
    /// was applied and is only consulted to resolve names.
    pub fn project(&mut self, event: &ServerEvent, state: Option<&GameState>) {
        match event {
            ServerEvent::GameStart { .. } => self.note("The game has begun."),
            // full snapshots are state assertions, not narrative
            ServerEvent::GameStateUpdate { .. } => {}
            ServerEvent::PhaseChange(payload) => {
                let day = state.map(|s| s.day).or(payload.day).unwrap_or(0);
                self.note(format!("Day {day}: {}.", payload.phase.description()));
            }
            ServerEvent::PlayerJoined { player } => {
                let name = if player.name.is_empty() {
                    player.id.clone()
                } else {
                    player.name.clone()
                };
                self.note(format!("{name} joined the room."));
            }
            ServerEvent::RoleAssignment(payload) => {
                self.note(format!("You are the {}.", payload.role));
                if !payload.teammates.is_empty() {
                    let mates = payload
                        .teammates
                        .iter()
                        .map(|t| {
                            if t.name.is_empty() {
                                t.id.clone()
                            } else {
                                t.name.clone()
                            }
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.note(format!("Your teammates: {mates}."));
                }
            }
            ServerEvent::NightResult(payload) => {
                if payload.dead.is_empty() {
                    self.note("The night passed peacefully.");
                } else {
                    let fallen = join_names(&payload.dead, state);
                    self.note(format!("Dawn breaks. The night claimed {fallen}."));
                }
            }
            ServerEvent::VoteUpdate { votes } => {
                self.note(format!("Votes cast so far: {}.", votes.len()));
            }
            ServerEvent::WerewolfVoteUpdate { .. } => {
                self.note("The wolves are converging on a target.");
            }
            ServerEvent::VoteResult(payload) => {
                if !payload.votes.is_empty() {
                    let pairs = payload
                        .votes
                        .iter()
                        .map(|(voter, target)| {
                            format!("{} -> {}", name_of(voter, state), name_of(target, state))
                        })
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.note(pairs);
                }
                match &payload.eliminated {
                    Some(id) => self.note(format!("{} was exiled by vote.", name_of(id, state))),
                    None => self.note("The vote was tied; no one was exiled."),
                }
            }
            ServerEvent::SeerResult { checked } => {
                for (id, verdict) in checked {
                    self.note(format!("Inspection: {} is {verdict}.", name_of(id, state)));
                }
            }
            ServerEvent::SheriffElection(payload) => {
                if payload.candidates.is_empty() {
                    self.note("Sheriff candidacy is open.");
                } else {
                    let names = join_names(&payload.candidates, state);
                    self.note(format!("Sheriff candidates: {names}."));
                }
            }
            ServerEvent::GameEvent { message } => self.note(message.clone()),
            ServerEvent::PlayerDisconnected { player_id } => {
                self.note(format!("{} lost connection.", name_of(player_id, state)));
            }
            // authorization to act, not something that happened
            ServerEvent::Panel(_) => {}
            ServerEvent::GameOver(payload) => {
                match payload.winner {
                    Winner::Good => self.note("The villagers win."),
                    Winner::Wolf => self.note("The werewolves win."),
                }
                if !payload.roles.is_empty() {
                    let reveals = payload
                        .roles
                        .iter()
                        .map(|(id, role)| format!("{} was the {role}", name_of(id, state)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    self.note(format!("{reveals}."));
                }
            }
            ServerEvent::Unknown { kind, .. } => {
                self.note(format!("Unhandled event: {kind}."));
            }
        }
    }
}

fn name_of(id: &PlayerId, state: Option<&GameState>) -> String {
    match state {
        Some(s) => s.display_name(id),
        None => id.clone(),
    }
}

fn join_names(ids: &[PlayerId], state: Option<&GameState>) -> String {
    ids.iter()
        .map(|id| name_of(id, state))
        .collect::<Vec<_>>()
        .join(", ")
}
