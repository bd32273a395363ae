// ==========================================
// 铁路罐车检修排程系统 - 产能台账 API
// ==========================================
// 职责: reserveCapacity / releaseCapacity / initializeCapacity
// 超额比例: 按厂修从 EngineConfig 解析 (按厂覆写优先)
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::config::engine_config::EngineConfig;
use crate::domain::capacity::{CapacityRecord, PlanMonth, ReserveOutcome};
use crate::repository::{CapacityLedgerRepository, ReferenceDataRepository};

pub struct CapacityApi {
    capacity_repo: Arc<CapacityLedgerRepository>,
    reference_repo: Arc<ReferenceDataRepository>,
    config: Arc<EngineConfig>,
}

impl CapacityApi {
    pub fn new(
        capacity_repo: Arc<CapacityLedgerRepository>,
        reference_repo: Arc<ReferenceDataRepository>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            capacity_repo,
            reference_repo,
            config,
        }
    }

    /// 预留槽位
    ///
    /// # 返回
    /// - Ok(true): 已预留
    /// - Ok(false): 超出上限或无台账记录, 计数未变
    pub fn reserve_capacity(&self, shop_code: &str, month: &str, count: i64) -> ApiResult<bool> {
        let month = parse_month(month)?;
        ensure_positive(count)?;
        let percent = self.config.capacity.overcommit_percent_for(shop_code);
        let outcome = self.capacity_repo.reserve(shop_code, month, count, percent)?;
        Ok(outcome.is_reserved())
    }

    /// 预留槽位, 拒绝时返回结构化错误
    pub fn reserve_capacity_strict(&self, shop_code: &str, month: &str, count: i64) -> ApiResult<i64> {
        let parsed = parse_month(month)?;
        ensure_positive(count)?;
        let percent = self.config.capacity.overcommit_percent_for(shop_code);
        match self.capacity_repo.reserve(shop_code, parsed, count, percent)? {
            ReserveOutcome::Reserved { allocated_count } => Ok(allocated_count),
            ReserveOutcome::Rejected {
                allocated_count,
                ceiling,
                ..
            } => Err(ApiError::OvercommitRejected {
                shop_code: shop_code.to_string(),
                month: parsed.to_string(),
                allocated_count,
                requested: count,
                ceiling,
            }),
        }
    }

    /// 完工释放
    pub fn release_capacity(&self, shop_code: &str, month: &str, count: i64) -> ApiResult<()> {
        let month = parse_month(month)?;
        ensure_positive(count)?;
        Ok(self.capacity_repo.release(shop_code, month, count)?)
    }

    /// 取消退回
    pub fn unreserve_capacity(&self, shop_code: &str, month: &str, count: i64) -> ApiResult<()> {
        let month = parse_month(month)?;
        ensure_positive(count)?;
        Ok(self.capacity_repo.unreserve(shop_code, month, count)?)
    }

    /// 初始化台账 (幂等)
    ///
    /// # 参数
    /// - shop_codes: 为空时使用全部在用厂修
    /// - default_capacity: 为空时使用配置中的默认产能
    ///
    /// # 返回
    /// - Ok(usize): 新插入的记录数
    pub fn initialize_capacity(
        &self,
        shop_codes: &[String],
        months: &[String],
        default_capacity: Option<i64>,
    ) -> ApiResult<usize> {
        let months = months
            .iter()
            .map(|m| parse_month(m))
            .collect::<ApiResult<Vec<_>>>()?;
        if months.is_empty() {
            return Err(ApiError::InvalidInput("月份列表不能为空".to_string()));
        }

        let shop_codes = if shop_codes.is_empty() {
            self.reference_repo
                .list_shops()?
                .into_iter()
                .map(|s| s.shop_code)
                .collect()
        } else {
            shop_codes.to_vec()
        };

        let capacity = default_capacity.unwrap_or(self.config.capacity.default_shop_capacity);
        Ok(self.capacity_repo.initialize(&shop_codes, &months, capacity)?)
    }

    pub fn get_capacity(&self, shop_code: &str, month: &str) -> ApiResult<Option<CapacityRecord>> {
        let month = parse_month(month)?;
        Ok(self.capacity_repo.find(shop_code, month)?)
    }

    pub fn list_window(&self, months: &[String]) -> ApiResult<Vec<CapacityRecord>> {
        let months = months
            .iter()
            .map(|m| parse_month(m))
            .collect::<ApiResult<Vec<_>>>()?;
        Ok(self.capacity_repo.list_window(&months)?)
    }
}

fn parse_month(raw: &str) -> ApiResult<PlanMonth> {
    PlanMonth::parse(raw)
        .ok_or_else(|| ApiError::InvalidInput(format!("无效的月份格式 (应为 YYYY-MM): {}", raw)))
}

fn ensure_positive(count: i64) -> ApiResult<()> {
    if count <= 0 {
        return Err(ApiError::InvalidInput(format!("车数必须大于 0: {}", count)));
    }
    Ok(())
}
