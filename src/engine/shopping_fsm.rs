// ==========================================
// 铁路罐车检修排程系统 - 检修生命周期状态机
// ==========================================
// 职责: 纯内存的转换校验与状态推进 (不访问数据库)
// 规则:
// - 正向可跳跃
// - 仅两条回退: ESTIMATE_APPROVED→ESTIMATE_RECEIVED, FINAL_APPROVED→FINAL_ESTIMATE_RECEIVED
// - DISPO_TO_DESTINATION 仅可由 FINAL_APPROVED 进入, 且必须携带处置去向
// - CLOSED 仅可由 DISPO_TO_DESTINATION 进入; 小修 (MRU) 可由 FINAL_APPROVED 直接关闭
// - CANCELLED 可由任意非终态进入
// - 终态不可再转换 (致命错误)
// ==========================================

use crate::config::engine_config::LifecycleConfig;
use crate::domain::shopping_event::{ShoppingEvent, TransitionRequest};
use crate::domain::types::ShoppingState;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// 允许的回退转换
const BACKWARD_LOOPS: [(ShoppingState, ShoppingState); 2] = [
    (ShoppingState::EstimateApproved, ShoppingState::EstimateReceived),
    (ShoppingState::FinalApproved, ShoppingState::FinalEstimateReceived),
];

// ==========================================
// TransitionError - 转换拒绝原因
// ==========================================
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("检修事件已处于终态, 不可再转换: event_id={event_id}, state={state}")]
    TerminalState {
        event_id: String,
        state: ShoppingState,
    },

    #[error("版本冲突: event_id={event_id}, expected_version={expected}, actual_version={actual}")]
    StaleVersion {
        event_id: String,
        expected: i64,
        actual: i64,
    },

    #[error("目标状态与当前状态相同: {state}")]
    SameState { state: ShoppingState },

    #[error("不允许的回退: from={from} to={to}")]
    BackwardNotAllowed {
        from: ShoppingState,
        to: ShoppingState,
    },

    #[error("DISPO_TO_DESTINATION 只能由 FINAL_APPROVED 进入: from={from}")]
    DispositionRequiresFinalApproved { from: ShoppingState },

    #[error("不允许关闭: from={from} (需经 DISPO_TO_DESTINATION, 或小修由 FINAL_APPROVED 直接关闭)")]
    CloseNotAllowed { from: ShoppingState },

    #[error("进入 DISPO_TO_DESTINATION 必须提供处置去向")]
    MissingDisposition,

    #[error("处置去向只能在进入 DISPO_TO_DESTINATION 时提供: to={to}")]
    UnexpectedDisposition { to: ShoppingState },
}

impl TransitionError {
    /// 致命错误: 需告警运维
    pub fn is_fatal(&self) -> bool {
        matches!(self, TransitionError::TerminalState { .. })
    }

    /// 可重试: 调用方应重新读取后再试
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransitionError::StaleVersion { .. })
    }

    /// 违反的规则代码
    pub fn rule_code(&self) -> &'static str {
        match self {
            TransitionError::TerminalState { .. } => "TERMINAL_STATE",
            TransitionError::StaleVersion { .. } => "STALE_VERSION",
            TransitionError::SameState { .. } => "SAME_STATE",
            TransitionError::BackwardNotAllowed { .. } => "BACKWARD_NOT_ALLOWED",
            TransitionError::DispositionRequiresFinalApproved { .. } => {
                "DISPOSITION_REQUIRES_FINAL_APPROVED"
            }
            TransitionError::CloseNotAllowed { .. } => "CLOSE_NOT_ALLOWED",
            TransitionError::MissingDisposition => "MISSING_DISPOSITION",
            TransitionError::UnexpectedDisposition { .. } => "UNEXPECTED_DISPOSITION",
        }
    }
}

// ==========================================
// ShoppingStateMachine
// ==========================================
pub struct ShoppingStateMachine {
    lifecycle: LifecycleConfig,
}

impl ShoppingStateMachine {
    pub fn new(lifecycle: LifecycleConfig) -> Self {
        Self { lifecycle }
    }

    /// 校验 (from, to) 是否为合法边 (不含版本与载荷检查)
    ///
    /// # 参数
    /// - minor_repair: 事件是否为小修例外
    pub fn check_edge(
        from: ShoppingState,
        to: ShoppingState,
        minor_repair: bool,
    ) -> Result<(), TransitionError> {
        if from == to {
            return Err(TransitionError::SameState { state: from });
        }
        if to == ShoppingState::Cancelled {
            return Ok(());
        }
        if to == ShoppingState::DispoToDestination && from != ShoppingState::FinalApproved {
            return Err(TransitionError::DispositionRequiresFinalApproved { from });
        }
        if to == ShoppingState::Closed {
            let allowed = from == ShoppingState::DispoToDestination
                || (from == ShoppingState::FinalApproved && minor_repair);
            if !allowed {
                return Err(TransitionError::CloseNotAllowed { from });
            }
            return Ok(());
        }

        match (from.ordinal(), to.ordinal()) {
            (Some(f), Some(t)) if t > f => Ok(()),
            _ if BACKWARD_LOOPS.contains(&(from, to)) => Ok(()),
            _ => Err(TransitionError::BackwardNotAllowed { from, to }),
        }
    }

    /// 当前状态下全部可达目标 (诊断用)
    pub fn allowed_targets(&self, event: &ShoppingEvent) -> Vec<ShoppingState> {
        if event.state.is_terminal() {
            return Vec::new();
        }
        let minor = self.is_minor_repair(event);
        ShoppingState::ALL
            .iter()
            .copied()
            .filter(|to| Self::check_edge(event.state, *to, minor).is_ok())
            .collect()
    }

    pub fn is_minor_repair(&self, event: &ShoppingEvent) -> bool {
        self.lifecycle
            .is_minor_repair(event.classification_code.as_deref())
    }

    /// 完整校验: 终态 → 版本 → 边 → 载荷
    pub fn validate(
        &self,
        event: &ShoppingEvent,
        request: &TransitionRequest,
    ) -> Result<(), TransitionError> {
        if event.state.is_terminal() {
            return Err(TransitionError::TerminalState {
                event_id: event.event_id.clone(),
                state: event.state,
            });
        }
        if event.version != request.expected_version {
            return Err(TransitionError::StaleVersion {
                event_id: event.event_id.clone(),
                expected: request.expected_version,
                actual: event.version,
            });
        }

        let to = request.target_state;
        Self::check_edge(event.state, to, self.is_minor_repair(event))?;

        let disposition = request.payload.disposition;
        match (to, disposition) {
            (ShoppingState::DispoToDestination, None) => Err(TransitionError::MissingDisposition),
            (ShoppingState::DispoToDestination, Some(_)) => Ok(()),
            (_, Some(_)) => Err(TransitionError::UnexpectedDisposition { to }),
            (_, None) => Ok(()),
        }
    }

    /// 校验并生成转换后的事件 (版本 +1, 首次到达时间只写一次)
    pub fn apply(
        &self,
        event: &ShoppingEvent,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<ShoppingEvent, TransitionError> {
        self.validate(event, request)?;

        let mut next = event.clone();
        next.state = request.target_state;
        next.state_timestamps.entry(request.target_state).or_insert(now);
        if request.target_state == ShoppingState::DispoToDestination {
            next.disposition = request.payload.disposition;
        }
        next.version = event.version + 1;
        next.updated_at = now;
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shopping_event::TransitionPayload;
    use crate::domain::types::Disposition;
    use chrono::Duration;

    fn machine() -> ShoppingStateMachine {
        ShoppingStateMachine::new(LifecycleConfig::default())
    }

    fn event_in(state: ShoppingState, classification: Option<&str>) -> ShoppingEvent {
        let mut event = ShoppingEvent::new(
            "E1".to_string(),
            "GATX1001".to_string(),
            classification.map(str::to_string),
            None,
            Utc::now(),
        );
        event.state = state;
        event
    }

    fn request(to: ShoppingState, version: i64) -> TransitionRequest {
        TransitionRequest {
            target_state: to,
            expected_version: version,
            payload: TransitionPayload::default(),
        }
    }

    #[test]
    fn test_forward_skip_allowed() {
        let event = event_in(ShoppingState::Event, None);
        let next = machine()
            .apply(&event, &request(ShoppingState::ShopAssigned, 0), Utc::now())
            .unwrap();
        assert_eq!(next.state, ShoppingState::ShopAssigned);
        assert_eq!(next.version, 1);
        assert!(next.reached_at(ShoppingState::ShopAssigned).is_some());
        // 跳过的状态不打时间戳
        assert!(next.reached_at(ShoppingState::Packet).is_none());
    }

    #[test]
    fn test_backward_rejected_except_loops() {
        let m = machine();
        let err = m
            .validate(
                &event_in(ShoppingState::ShopAssigned, None),
                &request(ShoppingState::Event, 0),
            )
            .unwrap_err();
        assert_eq!(err.rule_code(), "BACKWARD_NOT_ALLOWED");

        assert!(m
            .validate(
                &event_in(ShoppingState::EstimateApproved, None),
                &request(ShoppingState::EstimateReceived, 0),
            )
            .is_ok());
        assert!(m
            .validate(
                &event_in(ShoppingState::FinalApproved, None),
                &request(ShoppingState::FinalEstimateReceived, 0),
            )
            .is_ok());
        assert!(m
            .validate(
                &event_in(ShoppingState::FinalApproved, None),
                &request(ShoppingState::EstimateReceived, 0),
            )
            .is_err());
    }

    #[test]
    fn test_loop_keeps_first_timestamp() {
        let m = machine();
        let t0 = Utc::now();
        let mut event = event_in(ShoppingState::EstimateReceived, None);
        event.state_timestamps.insert(ShoppingState::EstimateReceived, t0);
        event.state_timestamps.insert(ShoppingState::EstimateApproved, t0);
        event.state = ShoppingState::EstimateApproved;

        let later = t0 + Duration::hours(3);
        let next = m
            .apply(&event, &request(ShoppingState::EstimateReceived, 0), later)
            .unwrap();
        assert_eq!(next.reached_at(ShoppingState::EstimateReceived), Some(t0));
        assert_eq!(next.updated_at, later);
    }

    #[test]
    fn test_disposition_rules() {
        let m = machine();
        let from_final = event_in(ShoppingState::FinalApproved, None);

        let err = m
            .validate(&from_final, &request(ShoppingState::DispoToDestination, 0))
            .unwrap_err();
        assert_eq!(err, TransitionError::MissingDisposition);

        let mut with_dispo = request(ShoppingState::DispoToDestination, 0);
        with_dispo.payload.disposition = Some(Disposition::ToCustomer);
        let next = m.apply(&from_final, &with_dispo, Utc::now()).unwrap();
        assert_eq!(next.disposition, Some(Disposition::ToCustomer));

        let err = m
            .validate(&event_in(ShoppingState::WorkInProgress, None), &with_dispo)
            .unwrap_err();
        assert_eq!(err.rule_code(), "DISPOSITION_REQUIRES_FINAL_APPROVED");

        let mut misplaced = request(ShoppingState::Arrived, 0);
        misplaced.payload.disposition = Some(Disposition::ToScrap);
        assert_eq!(
            m.validate(&event_in(ShoppingState::Enroute, None), &misplaced)
                .unwrap_err()
                .rule_code(),
            "UNEXPECTED_DISPOSITION"
        );
    }

    #[test]
    fn test_close_shortcut_only_for_minor_repair() {
        let m = machine();
        assert!(m
            .validate(
                &event_in(ShoppingState::FinalApproved, Some("MRU")),
                &request(ShoppingState::Closed, 0),
            )
            .is_ok());
        assert_eq!(
            m.validate(
                &event_in(ShoppingState::FinalApproved, Some("HEAVY")),
                &request(ShoppingState::Closed, 0),
            )
            .unwrap_err()
            .rule_code(),
            "CLOSE_NOT_ALLOWED"
        );
        assert!(m
            .validate(
                &event_in(ShoppingState::DispoToDestination, None),
                &request(ShoppingState::Closed, 0),
            )
            .is_ok());
        assert!(m
            .validate(
                &event_in(ShoppingState::Arrived, Some("MRU")),
                &request(ShoppingState::Closed, 0),
            )
            .is_err());
    }

    #[test]
    fn test_terminal_state_is_fatal() {
        let m = machine();
        for terminal in [ShoppingState::Closed, ShoppingState::Cancelled] {
            let err = m
                .validate(&event_in(terminal, None), &request(ShoppingState::Cancelled, 0))
                .unwrap_err();
            assert!(err.is_fatal());
            assert!(!err.is_retryable());
        }
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        let m = machine();
        for state in ShoppingState::ALL.iter().copied().filter(|s| !s.is_terminal()) {
            assert!(m
                .validate(&event_in(state, None), &request(ShoppingState::Cancelled, 0))
                .is_ok());
        }
    }

    #[test]
    fn test_stale_version_is_retryable() {
        let mut event = event_in(ShoppingState::Packet, None);
        event.version = 3;
        let err = machine()
            .validate(&event, &request(ShoppingState::Sow, 2))
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_allowed_targets_from_final_approved() {
        let m = machine();
        let targets = m.allowed_targets(&event_in(ShoppingState::FinalApproved, None));
        assert_eq!(
            targets,
            vec![
                ShoppingState::FinalEstimateReceived,
                ShoppingState::DispoToDestination,
                ShoppingState::Cancelled,
            ]
        );
        assert!(m.allowed_targets(&event_in(ShoppingState::Closed, None)).is_empty());
    }
}
