//! 探测模块
//! Probe module
//!
//! 用户、联系人、探测设置、探测记录以及紧急探测审计记录
//! Users, contacts, probe settings, probes and emergency probe audit rows

use crate::base::constants::DEFAULT_PROBE_CRON;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 探测状态
/// Probe status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
  /// 等待用户回复
  /// Waiting for the user to reply
  Pending,
  Good,
  Bad,
  /// 用户未回复，已升级到紧急联系人
  /// User never replied; escalated to the emergency contact
  Unavailable,
  /// 用户关闭了探测
  /// User disabled probing
  Cancelled,
}

impl ProbeStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Good => "good",
      Self::Bad => "bad",
      Self::Unavailable => "unavailable",
      Self::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for ProbeStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for ProbeStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "pending" => Ok(Self::Pending),
      "good" => Ok(Self::Good),
      "bad" => Ok(Self::Bad),
      "unavailable" => Ok(Self::Unavailable),
      "cancelled" => Ok(Self::Cancelled),
      other => Err(Error::store(format!("unknown probe status: {other}"))),
    }
  }
}

/// 将用户回复映射为探测状态
/// Map a user reply to a probe status
///
/// 忽略大小写和首尾空白；无法识别的回复返回 `None`
/// Case-insensitive and whitespace-trimmed; unrecognised replies yield `None`
pub fn status_from_last_response(text: &str) -> Option<ProbeStatus> {
  match text.trim().to_lowercase().as_str() {
    "yes" | "yeah" | "yh" | "y" => Some(ProbeStatus::Good),
    "no" | "nope" | "nah" | "na" | "n" => Some(ProbeStatus::Bad),
    _ => None,
  }
}

/// 一次存活探测
/// One liveliness check for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Probe {
  pub id: i64,
  pub user_id: i64,
  pub last_response: String,
  /// 已发送的跟进次数
  /// Follow-ups sent so far
  pub retry_count: i32,
  pub status: ProbeStatus,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Probe {
  /// 根据最后一次回复推导状态
  /// Status implied by the last response
  pub fn status_from_last_response(&self) -> Option<ProbeStatus> {
    status_from_last_response(&self.last_response)
  }

  pub fn is_pending(&self) -> bool {
    self.status == ProbeStatus::Pending
  }
}

/// 升级审计记录，创建后不再修改
/// Escalation audit row; never mutated after creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyProbe {
  pub id: i64,
  pub probe_id: i64,
  pub contact_id: i64,
  /// 紧急联系人消息是否发送成功
  /// Whether the emergency message was delivered
  pub delivered: bool,
  pub created_at: DateTime<Utc>,
}

/// 每个用户的探测设置
/// Per-user probe configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeSetting {
  pub user_id: i64,
  pub active: bool,
  pub cron_expression: String,
  pub updated_at: DateTime<Utc>,
}

impl ProbeSetting {
  /// 新用户的默认设置：未激活，每天中午
  /// Defaults for a new user: inactive, daily at noon
  pub fn default_for(user_id: i64, now: DateTime<Utc>) -> Self {
    Self {
      user_id,
      active: false,
      cron_expression: DEFAULT_PROBE_CRON.to_string(),
      updated_at: now,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
  pub id: i64,
  pub name: String,
  /// 交给 Messenger 的地址
  /// Address handed to the messenger
  pub destination: String,
  pub emergency_contact_id: Option<i64>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  pub destination: String,
  pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_response_mapping() {
    assert_eq!(status_from_last_response("Yeah"), Some(ProbeStatus::Good));
    assert_eq!(status_from_last_response("  YES \n"), Some(ProbeStatus::Good));
    assert_eq!(status_from_last_response("y"), Some(ProbeStatus::Good));
    assert_eq!(status_from_last_response("yh"), Some(ProbeStatus::Good));
    assert_eq!(status_from_last_response("nope"), Some(ProbeStatus::Bad));
    assert_eq!(status_from_last_response("NA"), Some(ProbeStatus::Bad));
    assert_eq!(status_from_last_response("n"), Some(ProbeStatus::Bad));
    assert_eq!(status_from_last_response("maybe"), None);
    assert_eq!(status_from_last_response(""), None);
    assert_eq!(status_from_last_response("yes please"), None);
  }

  #[test]
  fn test_probe_status_strings() {
    for status in [
      ProbeStatus::Pending,
      ProbeStatus::Good,
      ProbeStatus::Bad,
      ProbeStatus::Unavailable,
      ProbeStatus::Cancelled,
    ] {
      assert_eq!(status.as_str().parse::<ProbeStatus>().unwrap(), status);
    }
    assert!("lost".parse::<ProbeStatus>().is_err());
  }

  #[test]
  fn test_default_setting() {
    let setting = ProbeSetting::default_for(9, Utc::now());
    assert!(!setting.active);
    assert_eq!(setting.cron_expression, "0 0 12 * * *");
  }
}
