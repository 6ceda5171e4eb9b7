use std::time::Duration;

/// 任务失败次数上限，达到后任务进入 dead 状态
/// Attempts allowed before a job is marked dead
pub const MAX_FAILS: i32 = 4;

/// 探测跟进次数上限，超过后升级到紧急联系人
/// Follow-ups sent before a probe escalates to the emergency contact
pub const MAX_PROBE_RETRIES: i32 = 3;

/// 默认工作者数量
pub const DEFAULT_CONCURRENCY: usize = 3;

/// 工作者默认轮询间隔
/// Default worker poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// 空闲退避阶梯
/// Idle backoff ladder
pub const DEFAULT_BACKOFF_LADDER: [Duration; 6] = [
  Duration::from_secs(0),
  Duration::from_secs(1),
  Duration::from_secs(2),
  Duration::from_secs(5),
  Duration::from_secs(15),
  Duration::from_secs(30),
];

/// 存储错误后的退避时间
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// in-progress 任务被视为卡住的阈值
/// Age after which an in-progress job counts as abandoned
pub const DEFAULT_STALE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

/// Requeuer 未发现卡住任务时的休眠时间
pub const DEFAULT_REQUEUER_IDLE_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Promoter 检查间隔
pub const DEFAULT_PROMOTER_INTERVAL: Duration = Duration::from_secs(1);

/// 新用户的默认探测时间（每天 UTC 12:00）
/// Default probe schedule for new users (daily, 12:00 UTC)
pub const DEFAULT_PROBE_CRON: &str = "0 0 12 * * *";

/// 跟进扫描的默认周期（每 30 分钟）
/// Default follow-up sweep schedule (every 30 minutes)
pub const DEFAULT_FOLLOW_UP_CRON: &str = "0 */30 * * * *";

pub const SEND_INITIAL_PROBE_HANDLER: &str = "send_initial_probe";
pub const SWEEP_PENDING_PROBES_HANDLER: &str = "sweep_pending_probes";

/// 全局跟进扫描的 cron 标签
pub const FOLLOW_UP_TAG: &str = "follow_up_probes";
pub const PROBE_TAG_PREFIX: &str = "probe_";

/// 版本信息
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
