// ==========================================
// 铁路罐车检修排程系统 - API层错误类型
// ==========================================
// 职责: 把仓储层/状态机错误转换为调用方可区分的错误
// 分类: 可重试 (版本冲突) / 业务拒绝 / 致命 (终态再转换) / 基础设施
// ==========================================

use crate::engine::shopping_fsm::TransitionError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 产能台账
    // ==========================================
    #[error("超额上限拒绝: shop={shop_code}, month={month}, allocated={allocated_count}, requested={requested}, ceiling={ceiling}")]
    OvercommitRejected {
        shop_code: String,
        month: String,
        allocated_count: i64,
        requested: i64,
        ceiling: i64,
    },

    // ==========================================
    // 检修生命周期
    // ==========================================
    /// 违反转换规则 (rule 为规则代码)
    #[error("无效的状态转换 [{rule}]: {message}")]
    InvalidTransition { rule: String, message: String },

    #[error("进入 DISPO_TO_DESTINATION 必须提供处置去向")]
    MissingDisposition,

    /// 终态再转换: 致命, 需告警
    #[error("检修事件已处于终态: {0}")]
    TerminalState(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("版本冲突: {0}")]
    VersionConflict(String),

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 可重试: 调用方应重新读取后再试
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::VersionConflict(_))
    }

    /// 致命: 调用方逻辑缺陷, 需告警运维
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiError::TerminalState(_))
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                entity_id,
                expected,
                actual,
            } => ApiError::VersionConflict(format!(
                "{} 已被其他操作修改 (期望 version={}, 实际 version={})",
                entity_id, expected, actual
            )),

            // 产能台账
            RepositoryError::OvercommitRejected {
                shop_code,
                month,
                allocated_count,
                requested,
                ceiling,
                ..
            } => ApiError::OvercommitRejected {
                shop_code,
                month,
                allocated_count,
                requested,
                ceiling,
            },

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => ApiError::InvalidTransition {
                rule: "INVALID_STATUS".to_string(),
                message: format!("from={} to={}", from, to),
            },

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 TransitionError 转换
// ==========================================
impl From<TransitionError> for ApiError {
    fn from(err: TransitionError) -> Self {
        match &err {
            TransitionError::TerminalState { .. } => ApiError::TerminalState(err.to_string()),
            TransitionError::StaleVersion { .. } => ApiError::VersionConflict(err.to_string()),
            TransitionError::MissingDisposition => ApiError::MissingDisposition,
            _ => ApiError::InvalidTransition {
                rule: err.rule_code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
