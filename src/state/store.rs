//! Applies inbound events to the canonical `GameState` snapshot.

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::protocol::events::{
    GameOverPayload, NightResultPayload, PhaseChangePayload, RoleAssignmentPayload, ServerEvent,
    Teammate,
};
use crate::state::countdown::Countdown;
use crate::state::game_state::{GameState, InvariantCheck, Phase, Player, PlayerId, Role, StateError};

const LOG_TARGET: &str = "state::store";

/// The single canonical snapshot for the connected room, mutated only here.
///
/// The local player's role lives beside the snapshot rather than inside it:
/// server snapshots never carry unrevealed roles, so a full replace must not
/// be allowed to forget what this connection privately learned.
pub struct PhaseStateStore {
    local_player_id: PlayerId,
    state: Option<GameState>,
    my_role: Option<Role>,
    teammates: Vec<Teammate>,
    countdown: Countdown,
}

impl PhaseStateStore {
    pub fn new(local_player_id: PlayerId) -> (Self, watch::Receiver<u64>) {
        let (countdown, remaining) = Countdown::new();
        (
            Self {
                local_player_id,
                state: None,
                my_role: None,
                teammates: Vec::new(),
                countdown,
            },
            remaining,
        )
    }

    pub fn state(&self) -> Option<&GameState> {
        self.state.as_ref()
    }

    pub fn local_player_id(&self) -> &PlayerId {
        &self.local_player_id
    }

    pub fn local_player(&self) -> Option<&Player> {
        self.state.as_ref()?.player(&self.local_player_id)
    }

    pub fn is_local_alive(&self) -> bool {
        self.local_player().map(|p| p.is_alive).unwrap_or(false)
    }

    /// The locally known role; `None` means "my role unknown", never
    /// "no role".
    pub fn my_role(&self) -> Option<&Role> {
        self.my_role.as_ref()
    }

    pub fn teammates(&self) -> &[Teammate] {
        &self.teammates
    }

    pub fn subscribe_countdown(&self) -> watch::Receiver<u64> {
        self.countdown.subscribe()
    }

    /// Discards everything for a fresh connection. The server re-delivers a
    /// full authoritative snapshot after every (re)connect; nothing local
    /// carries over.
    pub fn reset(&mut self) {
        self.state = None;
        self.my_role = None;
        self.teammates.clear();
        self.countdown.disarm();
    }

    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::GameStart { room } | ServerEvent::GameStateUpdate { room } => {
                self.replace_snapshot(room);
            }
            ServerEvent::PlayerJoined { player } => self.apply_player_joined(player),
            ServerEvent::PhaseChange(payload) => self.apply_phase_change(payload),
            ServerEvent::RoleAssignment(payload) => self.apply_role_assignment(payload),
            ServerEvent::NightResult(payload) => self.apply_night_result(payload),
            ServerEvent::VoteResult(payload) => {
                if let Some(id) = &payload.eliminated {
                    self.mark_dead(std::slice::from_ref(id));
                }
            }
            ServerEvent::SheriffElection(payload) => {
                if let Some(state) = self.state.as_mut() {
                    state.sheriff_candidates = payload.candidates.clone();
                    state.current_speaker_id = payload.current_speaker_id.clone();
                }
            }
            ServerEvent::GameOver(payload) => self.apply_game_over(payload),
            // Narrative- or UI-only events; the snapshot is not involved.
            ServerEvent::VoteUpdate { .. }
            | ServerEvent::WerewolfVoteUpdate { .. }
            | ServerEvent::SeerResult { .. }
            | ServerEvent::GameEvent { .. }
            | ServerEvent::PlayerDisconnected { .. }
            | ServerEvent::Panel(_) => {}
            ServerEvent::Unknown { kind, .. } => {
                debug!(target = LOG_TARGET, kind, "unrecognized event leaves state unchanged");
            }
        }
    }

    /// Atomic full replace. The only path from an empty store to a populated
    /// one, and idempotent: re-applying the current snapshot is a no-op.
    fn replace_snapshot(&mut self, room: &GameState) {
        if self.state.as_ref() == Some(room) {
            return;
        }
        if let Err(StateError::InvariantViolation(what)) = room.validate_invariants() {
            warn!(target = LOG_TARGET, what, "server snapshot violates an invariant");
        }
        match room.phase_end_time {
            Some(deadline) => self.countdown.arm(deadline),
            None => self.countdown.disarm(),
        }
        self.state = Some(room.clone());
    }

    fn apply_player_joined(&mut self, player: &Player) {
        let Some(state) = self.state.as_mut() else {
            warn!(target = LOG_TARGET, "player joined before any snapshot; dropped");
            return;
        };
        if state.player(&player.id).is_some() {
            debug!(target = LOG_TARGET, player_id = %player.id, "duplicate join ignored");
            return;
        }
        state.players.push(player.clone());
    }

    fn apply_phase_change(&mut self, payload: &PhaseChangePayload) {
        let Some(state) = self.state.as_mut() else {
            warn!(target = LOG_TARGET, "phase change before any snapshot; dropped");
            return;
        };

        let day_advanced = payload.day.map_or(false, |d| d > state.day);
        if !day_advanced && payload.phase.order_index() < state.phase.order_index() {
            warn!(
                target = LOG_TARGET,
                from = ?state.phase,
                to = ?payload.phase,
                "phase moved backwards without a day change"
            );
        }
        if let Some(day) = payload.day {
            if day < state.day {
                warn!(target = LOG_TARGET, day, current = state.day, "day went backwards");
            }
            state.day = day;
        }

        state.phase = payload.phase;
        state.phase_end_time = payload.phase_end_time;

        for id in &payload.deaths {
            match state.players.iter_mut().find(|p| &p.id == id) {
                Some(player) => player.is_alive = false,
                None => warn!(target = LOG_TARGET, player_id = %id, "death for unknown player"),
            }
        }
        if !payload.deaths.is_empty() {
            state.nightly_deaths = payload.deaths.clone();
        }

        // phase-scoped fields are undefined outside their sub-flows
        if !matches!(
            payload.phase,
            Phase::SheriffElection | Phase::SheriffSpeech | Phase::SheriffVote
        ) {
            state.sheriff_candidates.clear();
        }
        if !matches!(payload.phase, Phase::SheriffSpeech | Phase::DayDiscussion) {
            state.current_speaker_id = None;
        }

        match payload.phase_end_time {
            Some(deadline) => self.countdown.arm(deadline),
            None => self.countdown.disarm(),
        }
    }

    fn apply_role_assignment(&mut self, payload: &RoleAssignmentPayload) {
        if payload.player_id != self.local_player_id {
            // unicast by contract; anything else would leak another player's
            // role into this store
            warn!(
                target = LOG_TARGET,
                addressee = %payload.player_id,
                "role assignment for another connection ignored"
            );
            return;
        }
        self.my_role = Some(payload.role.clone());
        self.teammates = payload.teammates.clone();
        if let Some(state) = self.state.as_mut() {
            if let Some(me) = state.player_mut(&payload.player_id) {
                me.role = Some(payload.role.clone());
            }
        }
    }

    fn apply_night_result(&mut self, payload: &NightResultPayload) {
        self.mark_dead(&payload.dead);
        if let Some(state) = self.state.as_mut() {
            state.nightly_deaths = payload.dead.clone();
        }
    }

    fn apply_game_over(&mut self, payload: &GameOverPayload) {
        let Some(state) = self.state.as_mut() else {
            warn!(target = LOG_TARGET, "game over before any snapshot; dropped");
            return;
        };
        state.phase = Phase::GameOver;
        state.winner = Some(payload.winner);
        for (id, role) in &payload.roles {
            if let Some(player) = state.player_mut(id) {
                player.role = Some(role.clone());
            }
        }
        if let Some(role) = payload.roles.get(&self.local_player_id) {
            self.my_role = Some(role.clone());
        }
        self.countdown.disarm();
    }

    fn mark_dead(&mut self, ids: &[PlayerId]) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        for id in ids {
            match state.player_mut(id) {
                Some(player) => player.is_alive = false,
                None => warn!(target = LOG_TARGET, player_id = %id, "death for unknown player"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::events::VoteResultPayload;
    use crate::state::game_state::Winner;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn player(id: &str) -> Player {
        Player {
            id: id.to_string(),
            profile_id: format!("profile-{id}"),
            name: id.to_uppercase(),
            avatar_url: None,
            seat: None,
            is_alive: true,
            role: None,
            is_sheriff: false,
            is_host: false,
            is_ready: false,
        }
    }

    fn room(players: &[&str]) -> GameState {
        GameState {
            room_id: "room-1".to_string(),
            players: players.iter().map(|id| player(id)).collect(),
            phase: Phase::Lobby,
            day: 0,
            host_id: "profile-a".to_string(),
            phase_end_time: None,
            sheriff_candidates: Vec::new(),
            current_speaker_id: None,
            nightly_deaths: Vec::new(),
            winner: None,
            game_config: None,
        }
    }

    fn store_with(players: &[&str]) -> PhaseStateStore {
        let (mut store, _rx) = PhaseStateStore::new("a".to_string());
        store.apply(&ServerEvent::GameStart { room: room(players) });
        store
    }

    #[test]
    fn duplicate_player_joined_is_idempotent() {
        let mut store = store_with(&["a", "b"]);
        let joined = ServerEvent::PlayerJoined { player: player("c") };
        store.apply(&joined);
        let once = store.state().unwrap().players.clone();
        store.apply(&joined);
        store.apply(&joined);
        assert_eq!(store.state().unwrap().players, once);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn duplicate_joins_converge_regardless_of_order() {
        use rand::seq::SliceRandom;
        use rand::{rngs::StdRng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..8 {
            let mut events: Vec<ServerEvent> = ["c", "d", "e", "c", "d", "e", "c"]
                .iter()
                .map(|id| ServerEvent::PlayerJoined { player: player(id) })
                .collect();
            events.shuffle(&mut rng);

            let mut store = store_with(&["a", "b"]);
            for event in &events {
                store.apply(event);
            }
            let mut ids: Vec<_> = store
                .state()
                .unwrap()
                .players
                .iter()
                .map(|p| p.id.clone())
                .collect();
            ids.sort();
            assert_eq!(ids, ["a", "b", "c", "d", "e"]);
        }
    }

    #[test]
    fn full_replace_leaves_no_residue() {
        let mut store = store_with(&["a", "b", "c"]);
        let mut first = room(&["a", "b", "c"]);
        first.sheriff_candidates = vec!["b".to_string()];
        first.current_speaker_id = Some("c".to_string());
        first.nightly_deaths = vec!["b".to_string()];
        store.apply(&ServerEvent::GameStateUpdate { room: first });

        let second = room(&["a", "b"]);
        store.apply(&ServerEvent::GameStateUpdate { room: second.clone() });
        assert_eq!(store.state(), Some(&second));
    }

    #[test]
    fn reapplying_the_same_snapshot_is_a_noop() {
        let snapshot = room(&["a", "b"]);
        let (mut store, _rx) = PhaseStateStore::new("a".to_string());
        store.apply(&ServerEvent::GameStart { room: snapshot.clone() });
        let once = store.state().cloned();
        store.apply(&ServerEvent::GameStart { room: snapshot });
        assert_eq!(store.state().cloned(), once);
    }

    #[test]
    fn foreign_role_assignment_never_populates_the_store() {
        let mut store = store_with(&["a", "b"]);
        store.apply(&ServerEvent::RoleAssignment(RoleAssignmentPayload {
            player_id: "b".to_string(),
            role: Role::new("werewolf"),
            teammates: Vec::new(),
        }));
        assert_eq!(store.state().unwrap().player("b").unwrap().role, None);
        assert_eq!(store.my_role(), None);
    }

    #[test]
    fn local_role_assignment_sets_role_and_teammates() {
        let mut store = store_with(&["a", "b"]);
        store.apply(&ServerEvent::RoleAssignment(RoleAssignmentPayload {
            player_id: "a".to_string(),
            role: Role::new("werewolf"),
            teammates: vec![Teammate {
                id: "b".to_string(),
                name: "B".to_string(),
                seat: None,
            }],
        }));
        assert_eq!(store.my_role(), Some(&Role::new("werewolf")));
        assert_eq!(store.teammates().len(), 1);
        assert_eq!(
            store.state().unwrap().player("a").unwrap().role,
            Some(Role::new("werewolf"))
        );
    }

    #[test]
    fn local_role_survives_a_full_replace() {
        let mut store = store_with(&["a", "b"]);
        store.apply(&ServerEvent::RoleAssignment(RoleAssignmentPayload {
            player_id: "a".to_string(),
            role: Role::new("seer"),
            teammates: Vec::new(),
        }));
        store.apply(&ServerEvent::GameStateUpdate { room: room(&["a", "b"]) });
        assert_eq!(store.my_role(), Some(&Role::new("seer")));
        // the snapshot itself is exactly the payload
        assert_eq!(store.state().unwrap().player("a").unwrap().role, None);
    }

    #[test]
    fn night_result_marks_deaths_without_touching_roles() {
        let mut store = store_with(&["a", "b", "c"]);
        store.apply(&ServerEvent::NightResult(NightResultPayload {
            dead: vec!["b".to_string()],
            saved: None,
            poisoned: None,
            checked: None,
        }));
        let state = store.state().unwrap();
        assert!(!state.player("b").unwrap().is_alive);
        assert!(state.players.iter().all(|p| p.role.is_none()));
        assert_eq!(state.nightly_deaths, vec!["b".to_string()]);
    }

    #[test]
    fn vote_result_eliminates_exactly_one() {
        let mut store = store_with(&["a", "b", "c"]);
        store.apply(&ServerEvent::VoteResult(VoteResultPayload {
            eliminated: Some("c".to_string()),
            votes: BTreeMap::new(),
        }));
        let state = store.state().unwrap();
        assert!(!state.player("c").unwrap().is_alive);
        assert!(state.player("a").unwrap().is_alive);
    }

    #[test]
    fn game_over_reveals_all_roles() {
        let mut store = store_with(&["a", "b"]);
        let mut roles = BTreeMap::new();
        roles.insert("a".to_string(), Role::new("villager"));
        roles.insert("b".to_string(), Role::new("werewolf"));
        store.apply(&ServerEvent::GameOver(GameOverPayload {
            winner: Winner::Wolf,
            roles,
        }));
        let state = store.state().unwrap();
        assert_eq!(state.phase, Phase::GameOver);
        assert_eq!(state.winner, Some(Winner::Wolf));
        assert_eq!(state.player("b").unwrap().role, Some(Role::new("werewolf")));
        assert_eq!(store.my_role(), Some(&Role::new("villager")));
    }

    #[tokio::test]
    async fn phase_change_with_deadline_arms_the_countdown() {
        let mut store = store_with(&["a", "b"]);
        let rx = store.subscribe_countdown();
        store.apply(&ServerEvent::PhaseChange(PhaseChangePayload {
            phase: Phase::Voting,
            day: Some(1),
            phase_end_time: Some(Utc::now() + chrono::Duration::seconds(45)),
            deaths: Vec::new(),
        }));
        let value = *rx.borrow();
        assert!((44..=45).contains(&value), "got {value}");
    }

    #[tokio::test]
    async fn untimed_phase_disarms_the_countdown() {
        let mut store = store_with(&["a", "b"]);
        let rx = store.subscribe_countdown();
        store.apply(&ServerEvent::PhaseChange(PhaseChangePayload {
            phase: Phase::Voting,
            day: None,
            phase_end_time: Some(Utc::now() + chrono::Duration::seconds(45)),
            deaths: Vec::new(),
        }));
        store.apply(&ServerEvent::PhaseChange(PhaseChangePayload {
            phase: Phase::VoteResolution,
            day: None,
            phase_end_time: None,
            deaths: Vec::new(),
        }));
        assert_eq!(*rx.borrow(), 0);
    }

    #[test]
    fn phase_change_deaths_update_the_roster() {
        let mut store = store_with(&["a", "b", "c"]);
        store.apply(&ServerEvent::PhaseChange(PhaseChangePayload {
            phase: Phase::Dawn,
            day: Some(1),
            phase_end_time: None,
            deaths: vec!["c".to_string()],
        }));
        let state = store.state().unwrap();
        assert!(!state.player("c").unwrap().is_alive);
        assert_eq!(state.nightly_deaths, vec!["c".to_string()]);
    }

    #[test]
    fn reset_discards_everything() {
        let mut store = store_with(&["a", "b"]);
        store.apply(&ServerEvent::RoleAssignment(RoleAssignmentPayload {
            player_id: "a".to_string(),
            role: Role::new("witch"),
            teammates: Vec::new(),
        }));
        store.reset();
        assert!(store.state().is_none());
        assert_eq!(store.my_role(), None);
        assert!(store.teammates().is_empty());
    }
}
