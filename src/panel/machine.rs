use tracing::{debug, warn};

use crate::error::LocalPolicyViolation;
use crate::protocol::events::{
    GuardPanelContext, PanelGrant, SeerPanelContext, ServerEvent, WerewolfPanelContext,
    WitchPanelContext,
};
use crate::protocol::intents::{ClientIntent, WitchAction};
use crate::state::{Phase, PlayerId, PhaseStateStore, Seat, MAX_SEATS};

const LOG_TARGET: &str = "panel";

/// The panel the render layer should present. Exactly one is active at a
/// time; `NoPanel` covers both "nothing to do" and the eliminated read-only
/// state.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum ActionPanel {
    #[default]
    NoPanel,
    Werewolf(WerewolfPanelContext),
    Witch(WitchPanelContext),
    Seer(SeerPanelContext),
    Guard(GuardPanelContext),
    SheriffElection,
    SpeechTurn,
    Vote,
    SheriffVote,
}

#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub enum Selection {
    #[default]
    None,
    Target(PlayerId),
    Witch(WitchAction),
}

/// Tracks the explicit grant held by this connection plus the player's
/// in-progress selection, and enforces local policy so forbidden intents
/// never reach the server.
///
/// Panels come from two sources: an explicit grant envelope (the night
/// roles), or the current phase alone (voting, the sheriff flow). Both are
/// reset by every phase change; that reset is the single point where
/// selection state is discarded.
pub struct PanelMachine {
    grant: Option<PanelGrant>,
    selection: Selection,
    /// An intent has been emitted for the current phase-grant; the action is
    /// spent until the next grant or phase change.
    confirmed: bool,
    start_requested: bool,
}

impl Default for PanelMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl PanelMachine {
    pub fn new() -> Self {
        Self {
            grant: None,
            selection: Selection::None,
            confirmed: false,
            start_requested: false,
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn has_pending_grant(&self) -> bool {
        self.grant.is_some() && !self.confirmed
    }

    /// Feeds one inbound event through the machine. Phase changes (and full
    /// snapshot replacements, which re-assert the phase wholesale) reset
    /// everything; panel grants activate the corresponding panel.
    pub fn on_event(&mut self, event: &ServerEvent, store: &PhaseStateStore) {
        match event {
            ServerEvent::PhaseChange(_)
            | ServerEvent::GameStart { .. }
            | ServerEvent::GameStateUpdate { .. }
            | ServerEvent::GameOver(_) => self.reset(),
            ServerEvent::Panel(grant) => {
                if !store.is_local_alive() {
                    // eliminated players never receive an interactive panel
                    warn!(target = LOG_TARGET, "panel grant while dead ignored");
                    return;
                }
                debug!(target = LOG_TARGET, grant = grant_name(grant), "panel granted");
                self.grant = Some(grant.clone());
                self.selection = Selection::None;
                self.confirmed = false;
            }
            _ => {}
        }
    }

    /// The currently active panel, derived from the held grant or, failing
    /// that, from the phase itself.
    pub fn active_panel(&self, store: &PhaseStateStore) -> ActionPanel {
        let Some(state) = store.state() else {
            return ActionPanel::NoPanel;
        };
        let Some(me) = store.local_player() else {
            return ActionPanel::NoPanel;
        };
        if !me.is_alive || self.confirmed {
            return ActionPanel::NoPanel;
        }

        if let Some(grant) = &self.grant {
            return match grant {
                PanelGrant::Werewolf(ctx) => ActionPanel::Werewolf(ctx.clone()),
                PanelGrant::Witch(ctx) => ActionPanel::Witch(ctx.clone()),
                PanelGrant::Seer(ctx) => ActionPanel::Seer(ctx.clone()),
                PanelGrant::Guard(ctx) => ActionPanel::Guard(ctx.clone()),
            };
        }

        match state.phase {
            Phase::Voting => ActionPanel::Vote,
            Phase::SheriffElection => ActionPanel::SheriffElection,
            Phase::SheriffVote => ActionPanel::SheriffVote,
            Phase::SheriffSpeech | Phase::DayDiscussion
                if state.current_speaker_id.as_deref() == Some(me.id.as_str()) =>
            {
                ActionPanel::SpeechTurn
            }
            _ => ActionPanel::NoPanel,
        }
    }

    /// Selects (or re-selects) a candidate target in the active targeting
    /// panel. Selecting a disabled target is a rejection, not an error sent
    /// anywhere.
    pub fn select(
        &mut self,
        target: PlayerId,
        store: &PhaseStateStore,
    ) -> Result<(), LocalPolicyViolation> {
        self.require_alive(store)?;
        match self.active_panel(store) {
            ActionPanel::Werewolf(ctx) => Self::require_listed(&ctx.players, &target)?,
            ActionPanel::Seer(ctx) => Self::require_listed(&ctx.players, &target)?,
            ActionPanel::Guard(ctx) => {
                if ctx.last_guarded_id.as_ref() == Some(&target) {
                    // no consecutive same-target guard
                    return Err(LocalPolicyViolation::TargetForbidden(target));
                }
                Self::require_listed(&ctx.players, &target)?;
            }
            ActionPanel::Vote => {
                let living = store
                    .state()
                    .and_then(|s| s.player(&target))
                    .map(|p| p.is_alive)
                    .unwrap_or(false);
                if !living {
                    return Err(LocalPolicyViolation::TargetForbidden(target));
                }
            }
            ActionPanel::SheriffVote => {
                let candidate = store
                    .state()
                    .map(|s| s.sheriff_candidates.contains(&target))
                    .unwrap_or(false);
                if !candidate {
                    return Err(LocalPolicyViolation::TargetForbidden(target));
                }
            }
            ActionPanel::Witch(_) => {
                // witch targeting goes through select_poison
                return Err(LocalPolicyViolation::TargetForbidden(target));
            }
            ActionPanel::NoPanel | ActionPanel::SheriffElection | ActionPanel::SpeechTurn => {
                return Err(LocalPolicyViolation::NoPanelActive);
            }
        }
        self.selection = Selection::Target(target);
        Ok(())
    }

    /// Chooses the save potion. Only meaningful inside a witch panel whose
    /// grant still carries the save.
    pub fn select_save(&mut self, store: &PhaseStateStore) -> Result<(), LocalPolicyViolation> {
        self.require_alive(store)?;
        match self.active_panel(store) {
            ActionPanel::Witch(ctx) => {
                if !ctx.has_save {
                    return Err(LocalPolicyViolation::PotionSpent);
                }
                self.selection = Selection::Witch(WitchAction::Save);
                Ok(())
            }
            ActionPanel::NoPanel => Err(LocalPolicyViolation::NoPanelActive),
            _ => Err(LocalPolicyViolation::WrongPhase),
        }
    }

    /// Chooses the poison and its target.
    pub fn select_poison(
        &mut self,
        target: PlayerId,
        store: &PhaseStateStore,
    ) -> Result<(), LocalPolicyViolation> {
        self.require_alive(store)?;
        match self.active_panel(store) {
            ActionPanel::Witch(ctx) => {
                if !ctx.has_poison {
                    return Err(LocalPolicyViolation::PotionSpent);
                }
                Self::require_listed(&ctx.players, &target)?;
                self.selection = Selection::Witch(WitchAction::Poison {
                    target_player_id: target,
                });
                Ok(())
            }
            ActionPanel::NoPanel => Err(LocalPolicyViolation::NoPanelActive),
            _ => Err(LocalPolicyViolation::WrongPhase),
        }
    }

    /// Confirms the current selection, yielding the one intent this
    /// phase-grant is worth. The machine returns to `NoPanel` locally; the
    /// server's next phase change is the authoritative confirmation.
    pub fn confirm(&mut self, store: &PhaseStateStore) -> Result<ClientIntent, LocalPolicyViolation> {
        self.require_alive(store)?;
        if self.confirmed {
            return Err(LocalPolicyViolation::AlreadyConfirmed);
        }
        let intent = match self.active_panel(store) {
            ActionPanel::NoPanel => return Err(LocalPolicyViolation::NoPanelActive),
            ActionPanel::Werewolf(_) => ClientIntent::WerewolfVote {
                target_player_id: self.take_target()?,
            },
            ActionPanel::Seer(_) => ClientIntent::SeerCheck {
                target_player_id: self.take_target()?,
            },
            ActionPanel::Guard(_) => ClientIntent::GuardAction {
                target_player_id: self.take_target()?,
            },
            ActionPanel::Vote => ClientIntent::VotePlayer {
                target_player_id: self.take_target()?,
            },
            ActionPanel::SheriffVote => ClientIntent::SheriffVote {
                target_player_id: self.take_target()?,
            },
            ActionPanel::Witch(_) => match &self.selection {
                Selection::Witch(action) => ClientIntent::WitchAction(action.clone()),
                _ => return Err(LocalPolicyViolation::NothingSelected),
            },
            ActionPanel::SheriffElection => ClientIntent::RunForSheriff,
            ActionPanel::SpeechTurn => ClientIntent::PassTurn,
        };
        self.grant = None;
        self.selection = Selection::None;
        self.confirmed = true;
        Ok(intent)
    }

    /// Retracts a sheriff candidacy. Allowed while the election is open even
    /// after the candidacy intent went out.
    pub fn withdraw_candidacy(
        &mut self,
        store: &PhaseStateStore,
    ) -> Result<ClientIntent, LocalPolicyViolation> {
        self.require_alive(store)?;
        let in_election = store
            .state()
            .map(|s| s.phase == Phase::SheriffElection)
            .unwrap_or(false);
        if !in_election {
            return Err(LocalPolicyViolation::WrongPhase);
        }
        Ok(ClientIntent::WithdrawCandidacy)
    }

    /// Host-only start affordance: lobby only, single-intent-then-wait.
    pub fn start_game(
        &mut self,
        store: &PhaseStateStore,
    ) -> Result<ClientIntent, LocalPolicyViolation> {
        let Some(state) = store.state() else {
            return Err(LocalPolicyViolation::WrongPhase);
        };
        if state.phase != Phase::Lobby {
            return Err(LocalPolicyViolation::WrongPhase);
        }
        let is_host = store
            .local_player()
            .map(|me| state.is_host_profile(&me.profile_id))
            .unwrap_or(false);
        if !is_host {
            return Err(LocalPolicyViolation::NotHost);
        }
        if self.start_requested {
            return Err(LocalPolicyViolation::AlreadyConfirmed);
        }
        self.start_requested = true;
        Ok(ClientIntent::StartGame)
    }

    pub fn take_seat(
        &mut self,
        seat: Seat,
        store: &PhaseStateStore,
    ) -> Result<ClientIntent, LocalPolicyViolation> {
        let Some(state) = store.state() else {
            return Err(LocalPolicyViolation::WrongPhase);
        };
        if state.phase != Phase::Lobby {
            return Err(LocalPolicyViolation::WrongPhase);
        }
        if seat >= MAX_SEATS || state.seat_taken(seat) {
            return Err(LocalPolicyViolation::SeatUnavailable(seat));
        }
        Ok(ClientIntent::TakeSeat { seat })
    }

    pub fn ready_toggle(
        &mut self,
        store: &PhaseStateStore,
    ) -> Result<ClientIntent, LocalPolicyViolation> {
        let in_lobby = store
            .state()
            .map(|s| s.phase == Phase::Lobby)
            .unwrap_or(false);
        if !in_lobby {
            return Err(LocalPolicyViolation::WrongPhase);
        }
        Ok(ClientIntent::ReadyToggle)
    }

    fn reset(&mut self) {
        self.grant = None;
        self.selection = Selection::None;
        self.confirmed = false;
        self.start_requested = false;
    }

    fn require_alive(&self, store: &PhaseStateStore) -> Result<(), LocalPolicyViolation> {
        if store.is_local_alive() {
            Ok(())
        } else {
            Err(LocalPolicyViolation::ActorDead)
        }
    }

    fn require_listed(
        players: &[crate::state::Player],
        target: &PlayerId,
    ) -> Result<(), LocalPolicyViolation> {
        if players.iter().any(|p| &p.id == target && p.is_alive) {
            Ok(())
        } else {
            Err(LocalPolicyViolation::TargetForbidden(target.clone()))
        }
    }

    fn take_target(&self) -> Result<PlayerId, LocalPolicyViolation> {
        match &self.selection {
            Selection::Target(id) => Ok(id.clone()),
            _ => Err(LocalPolicyViolation::NothingSelected),
        }
    }
}

fn grant_name(grant: &PanelGrant) -> &'static str {
    match grant {
        PanelGrant::Werewolf(_) => "werewolf",
        PanelGrant::Witch(_) => "witch",
        PanelGrant::Seer(_) => "seer",
        PanelGrant::Guard(_) => "guard",
    }
}
