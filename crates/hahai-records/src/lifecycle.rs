//! 记录生命周期状态机
//!
//! CREATED_TEMP → PROMOTED | CANCELLED | EXPIRED，后三者均为终态

use hahai_core::utils::is_temp_id;
use hahai_core::{HahaiError, PatientRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 记录状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordState {
    CreatedTemp,
    Promoted,
    Cancelled,
    Expired,
}

impl RecordState {
    /// 根据存储中读出的记录推断当前状态
    pub fn of(record: &PatientRecord) -> Self {
        if record.is_temp && is_temp_id(&record.case_id) {
            RecordState::CreatedTemp
        } else {
            RecordState::Promoted
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RecordState::CreatedTemp)
    }
}

/// 状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RecordEvent {
    Promote,
    Cancel,
    /// 存储层过期，无应用层动作
    Expire,
}

/// 记录状态机
#[derive(Debug)]
pub struct RecordStateMachine {
    transitions: HashMap<(RecordState, RecordEvent), RecordState>,
}

impl RecordStateMachine {
    pub fn new() -> Self {
        let mut transitions = HashMap::new();

        transitions.insert((RecordState::CreatedTemp, RecordEvent::Promote), RecordState::Promoted);
        transitions.insert((RecordState::CreatedTemp, RecordEvent::Cancel), RecordState::Cancelled);
        transitions.insert((RecordState::CreatedTemp, RecordEvent::Expire), RecordState::Expired);

        Self { transitions }
    }

    pub fn can_transition(&self, from: &RecordState, event: &RecordEvent) -> bool {
        self.transitions.contains_key(&(*from, *event))
    }

    /// 执行状态转换
    pub fn transition(&self, from: &RecordState, event: &RecordEvent) -> Result<RecordState> {
        match self.transitions.get(&(*from, *event)) {
            Some(to) => Ok(*to),
            None => Err(HahaiError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            }),
        }
    }

    pub fn get_possible_events(&self, current_state: &RecordState) -> Vec<RecordEvent> {
        self.transitions
            .keys()
            .filter(|(state, _)| state == current_state)
            .map(|(_, event)| *event)
            .collect()
    }
}

impl Default for RecordStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
