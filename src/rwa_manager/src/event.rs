use crate::numeric::{self, U256};
use crate::state::{FileParameter, State};
use crate::InitArg;
use candid::Principal;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    #[serde(rename = "init")]
    Init(InitArg),

    #[serde(rename = "rely")]
    Rely { usr: Principal },

    #[serde(rename = "deny")]
    Deny { usr: Principal },

    #[serde(rename = "file")]
    File { what: String, data: Principal },

    #[serde(rename = "set_operator")]
    SetOperator { operator: Principal },

    #[serde(rename = "lock")]
    Lock {
        #[serde(with = "numeric::decimal")]
        wad: U256,
    },

    #[serde(rename = "release")]
    Release,

    #[serde(rename = "join")]
    Join {
        #[serde(with = "numeric::decimal")]
        wad: U256,
    },

    #[serde(rename = "exit")]
    Exit {
        #[serde(with = "numeric::decimal")]
        wad: U256,
    },

    #[serde(rename = "draw")]
    Draw {
        #[serde(with = "numeric::decimal")]
        wad: U256,
    },

    #[serde(rename = "wipe")]
    Wipe {
        #[serde(with = "numeric::decimal")]
        wad: U256,
    },

    #[serde(rename = "tell")]
    Tell {
        #[serde(with = "numeric::decimal")]
        ink: U256,
    },

    #[serde(rename = "unwind")]
    Unwind {
        #[serde(with = "numeric::decimal")]
        pay_back: U256,
    },

    #[serde(rename = "sink")]
    Sink {
        #[serde(with = "numeric::decimal")]
        tab: U256,
    },

    #[serde(rename = "recover")]
    Recover {
        #[serde(with = "numeric::decimal")]
        recovered: U256,
        #[serde(with = "numeric::decimal")]
        pay_back: U256,
    },

    #[serde(rename = "cage")]
    Cage,

    #[serde(rename = "migrate")]
    Migrate { dst: Principal },
}

impl Event {
    /// True for events that move tokens or debt rather than configuration.
    pub fn is_position_related(&self) -> bool {
        match self {
            Event::Init(_) => false,
            Event::Rely { .. } => false,
            Event::Deny { .. } => false,
            Event::File { .. } => false,
            Event::SetOperator { .. } => false,
            Event::Lock { .. } => true,
            Event::Release => true,
            Event::Join { .. } => true,
            Event::Exit { .. } => true,
            Event::Draw { .. } => true,
            Event::Wipe { .. } => true,
            Event::Tell { .. } => true,
            Event::Unwind { .. } => true,
            Event::Sink { .. } => true,
            Event::Recover { .. } => true,
            Event::Cage => false,
            Event::Migrate { .. } => false,
        }
    }
}

#[derive(Debug)]
pub enum ReplayLogError {
    /// There are no events in the event log.
    EmptyLog,
    /// The event log is inconsistent.
    InconsistentLog(String),
}

pub fn replay(mut events: impl Iterator<Item = Event>) -> Result<State, ReplayLogError> {
    let mut state = match events.next() {
        Some(Event::Init(args)) => State::from(args),
        Some(evt) => {
            return Err(ReplayLogError::InconsistentLog(format!(
                "The first event is not Init: {:?}",
                evt
            )))
        }
        None => return Err(ReplayLogError::EmptyLog),
    };
    for event in events {
        match event {
            Event::Init(_) => {
                return Err(ReplayLogError::InconsistentLog(
                    "should have only one init event".to_string(),
                ))
            }
            Event::Rely { usr } => state.rely(usr),
            Event::Deny { usr } => state.deny(usr),
            Event::File { what, data } => {
                let what = FileParameter::parse(&what).map_err(|e| {
                    ReplayLogError::InconsistentLog(format!("bad file event: {}", e))
                })?;
                state.file(what, data);
            }
            Event::SetOperator { operator } => state.set_operator(operator),
            Event::Lock { .. } => state.mark_live(),
            Event::Tell { .. } => state.trigger_soft_liquidation(),
            Event::Sink { tab } => state.write_off(tab),
            Event::Recover { pay_back, .. } => {
                state.reduce_tab(pay_back).map_err(|e| {
                    ReplayLogError::InconsistentLog(format!(
                        "recovery of {} exceeds the tab {}: {}",
                        pay_back, state.tab, e
                    ))
                })?;
            }
            Event::Cage | Event::Migrate { .. } => state.retire(),
            // Balance movements live on the collaborators, not in the manager state.
            Event::Release
            | Event::Join { .. }
            | Event::Exit { .. }
            | Event::Draw { .. }
            | Event::Wipe { .. }
            | Event::Unwind { .. } => {}
        }
    }
    Ok(state)
}

pub fn record_rely(state: &mut State, usr: Principal) {
    state.push_event(Event::Rely { usr });
    state.rely(usr);
}

pub fn record_deny(state: &mut State, usr: Principal) {
    state.push_event(Event::Deny { usr });
    state.deny(usr);
}

pub fn record_file(state: &mut State, what: FileParameter, raw: &str, data: Principal) {
    state.push_event(Event::File {
        what: raw.to_string(),
        data,
    });
    state.file(what, data);
}

pub fn record_set_operator(state: &mut State, operator: Principal) {
    state.push_event(Event::SetOperator { operator });
    state.set_operator(operator);
}

pub fn record_lock(state: &mut State, wad: U256) {
    state.push_event(Event::Lock { wad });
    state.mark_live();
}

pub fn record_release(state: &mut State) {
    state.push_event(Event::Release);
}

pub fn record_join(state: &mut State, wad: U256) {
    state.push_event(Event::Join { wad });
}

pub fn record_exit(state: &mut State, wad: U256) {
    state.push_event(Event::Exit { wad });
}

pub fn record_draw(state: &mut State, wad: U256) {
    state.push_event(Event::Draw { wad });
}

pub fn record_wipe(state: &mut State, wad: U256) {
    state.push_event(Event::Wipe { wad });
}

pub fn record_tell(state: &mut State, ink: U256) {
    state.push_event(Event::Tell { ink });
    state.trigger_soft_liquidation();
}

pub fn record_unwind(state: &mut State, pay_back: U256) {
    state.push_event(Event::Unwind { pay_back });
}

pub fn record_sink(state: &mut State, tab: U256) {
    state.push_event(Event::Sink { tab });
    state.write_off(tab);
}

pub fn record_recover(
    state: &mut State,
    recovered: U256,
    pay_back: U256,
) -> Result<(), crate::ManagerError> {
    state.reduce_tab(pay_back)?;
    state.push_event(Event::Recover {
        recovered,
        pay_back,
    });
    Ok(())
}

pub fn record_cage(state: &mut State) {
    state.push_event(Event::Cage);
    state.retire();
}

pub fn record_migrate(state: &mut State, dst: Principal) {
    state.push_event(Event::Migrate { dst });
    state.retire();
}
