use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::members::models::{DebitOrderStatus, Member};

/// In-memory member roster, fed by the policy-administration system.
pub struct MemberRepository {
    members: tokio::sync::RwLock<HashMap<Uuid, Member>>,
}

impl MemberRepository {
    pub fn new() -> Self {
        Self {
            members: tokio::sync::RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, member: Member) -> AppResult<Member> {
        let mut members = self.members.write().await;
        members.insert(member.id, member.clone());
        Ok(member)
    }

    pub async fn get(&self, member_id: Uuid) -> AppResult<Member> {
        let members = self.members.read().await;
        members
            .get(&member_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", member_id)))
    }

    pub async fn list(&self) -> AppResult<Vec<Member>> {
        let members = self.members.read().await;
        let mut all: Vec<Member> = members.values().cloned().collect();
        all.sort_by(|a, b| a.member_number.cmp(&b.member_number));
        Ok(all)
    }

    /// Members eligible for collection: active debit order, positive premium,
    /// optionally restricted to a set of broker groups.
    pub async fn list_eligible(&self, broker_groups: Option<&[String]>) -> AppResult<Vec<Member>> {
        let members = self.members.read().await;
        let mut eligible: Vec<Member> = members
            .values()
            .filter(|m| m.debit_order_status == DebitOrderStatus::Active)
            .filter(|m| m.monthly_premium > Decimal::ZERO)
            .filter(|m| match broker_groups {
                Some(groups) => groups.iter().any(|g| g == &m.broker_group),
                None => true,
            })
            .cloned()
            .collect();
        eligible.sort_by(|a, b| a.member_number.cmp(&b.member_number));
        Ok(eligible)
    }

    /// Adjust the arrears balance by `delta` (positive on a failed collection).
    pub async fn adjust_arrears(&self, member_id: Uuid, delta: Decimal) -> AppResult<Member> {
        let mut members = self.members.write().await;
        let member = members
            .get_mut(&member_id)
            .ok_or_else(|| AppError::NotFound(format!("Member {} not found", member_id)))?;

        member.arrears_balance += delta;
        member.updated_at = Utc::now();

        Ok(member.clone())
    }
}
