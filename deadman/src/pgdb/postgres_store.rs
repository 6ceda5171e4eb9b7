//! PostgresSQL 存储实现
//! PostgresSQL store implementation

use crate::error::Result;
use crate::pgdb::entity::{Contacts, EmergencyProbes, Jobs, ProbeSettings, Probes, Users};
use sea_orm::{
  ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, EntityTrait, Schema,
  SqlErr,
};

/// 部分唯一索引保证同名唯一任务和每个用户的 pending 探测各只有一条
/// Partial unique indexes back unique job names and the single pending probe per user
const INDEX_SQL: &str = r#"
  CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_unique_name ON jobs(name)
    WHERE is_unique AND status IN ('scheduled', 'enqueued', 'in-progress');
  CREATE INDEX IF NOT EXISTS idx_jobs_status_claimed ON jobs(status, claimed, id);
  CREATE INDEX IF NOT EXISTS idx_jobs_status_updated_at ON jobs(status, updated_at);
  CREATE INDEX IF NOT EXISTS idx_jobs_run_after ON jobs(run_after) WHERE status = 'scheduled';
  CREATE UNIQUE INDEX IF NOT EXISTS idx_probes_pending_user ON probes(user_id)
    WHERE status = 'pending';
  CREATE INDEX IF NOT EXISTS idx_contacts_user_id ON contacts(user_id);
  CREATE INDEX IF NOT EXISTS idx_emergency_probes_probe_id ON emergency_probes(probe_id);
"#;

/// PostgresSQL 存储
/// PostgresSQL store
#[derive(Clone)]
pub struct PostgresStore {
  db: DatabaseConnection,
}

impl PostgresStore {
  /// 连接数据库并初始化 schema
  /// Connect and initialize the schema
  pub async fn new(database_url: &str) -> Result<Self> {
    let opt = ConnectOptions::new(database_url)
      .max_connections(10)
      .sqlx_logging(false)
      .to_owned();
    let db = Database::connect(opt).await?;
    let store = Self { db };
    store.init_schema().await?;
    tracing::info!("postgres store ready");
    Ok(store)
  }

  /// 从现有数据库连接创建，不初始化 schema
  /// Wrap an existing connection without touching the schema
  pub fn from_connection(db: DatabaseConnection) -> Self {
    Self { db }
  }

  pub fn db(&self) -> &DatabaseConnection {
    &self.db
  }

  /// 初始化数据库 schema，可重复执行
  /// Initialize the database schema; safe to run repeatedly
  pub async fn init_schema(&self) -> Result<()> {
    let backend = self.db.get_database_backend();
    let schema = Schema::new(backend);

    let mut statements = vec![
      schema.create_table_from_entity(Jobs),
      schema.create_table_from_entity(Users),
      schema.create_table_from_entity(Contacts),
      schema.create_table_from_entity(ProbeSettings),
      schema.create_table_from_entity(Probes),
      schema.create_table_from_entity(EmergencyProbes),
    ];
    for stmt in statements.iter_mut() {
      stmt.if_not_exists();
      self.db.execute(backend.build(&*stmt)).await?;
    }

    // 多条语句需要走非预编译路径
    // Multiple statements need the unprepared path
    self.db.execute_unprepared(INDEX_SQL).await?;
    Ok(())
  }
}

/// 是否违反唯一约束
/// Whether the error is a unique constraint violation
pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
  matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
    || err.to_string().contains("duplicate key")
}
