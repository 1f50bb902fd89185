use async_trait::async_trait;
use mysql_async::consts::ColumnType;
use mysql_async::{Column, Conn, OptsBuilder, Pool, SslOpts, prelude::Queryable};
use std::sync::Arc;
use std::time::Duration;

use crate::config::StorageConfig;
use crate::models::{Cell, ResultSet};
use crate::services::query_engine::QueryExecutor;
use crate::utils::error::ExecutionError;

/// Storage client over the MySQL wire protocol (ClickHouse MySQL interface, StarRocks, Doris)
#[derive(Clone)]
pub struct MySQLClient {
    pool: Arc<Pool>,
    connect_timeout: Duration,
}

impl MySQLClient {
    /// Build a pooled client from `[storage]`
    pub fn new(config: &StorageConfig) -> Result<Self, ExecutionError> {
        let constraints = mysql_async::PoolConstraints::new(1, 10).ok_or_else(|| {
            ExecutionError::Connectivity(
                "Failed to create pool constraints: invalid min/max values".to_string(),
            )
        })?;

        let opts = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .user(Some(&config.user))
            .pass(Some(&config.password).filter(|p| !p.is_empty()))
            .db_name(Some(&config.database))
            .prefer_socket(false)
            .ssl_opts(None::<SslOpts>)
            .tcp_keepalive(Some(30_000_u32))
            .tcp_nodelay(true)
            .pool_opts(
                mysql_async::PoolOpts::default()
                    .with_constraints(constraints)
                    .with_inactive_connection_ttl(Duration::from_secs(300))
                    .with_ttl_check_interval(Duration::from_secs(60)),
            );

        tracing::info!(
            "Storage pool configured for {}:{}/{}",
            config.host,
            config.port,
            config.database
        );

        Ok(Self {
            pool: Arc::new(Pool::new(opts)),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
        })
    }

    async fn get_conn(&self) -> Result<Conn, ExecutionError> {
        match tokio::time::timeout(self.connect_timeout, self.pool.get_conn()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                tracing::error!("Failed to get connection from pool: {}", e);
                Err(map_mysql_error(e))
            },
            Err(_) => {
                tracing::error!(
                    "Timed out after {}s waiting for a storage connection",
                    self.connect_timeout.as_secs()
                );
                Err(ExecutionError::Connectivity(format!(
                    "connection not established within {}s",
                    self.connect_timeout.as_secs()
                )))
            },
        }
    }

    /// Round-trip a trivial statement to confirm the server answers
    pub async fn ping(&self) -> Result<(), ExecutionError> {
        let mut conn = self.get_conn().await?;
        conn.query_drop("SELECT 1").await.map_err(|e| {
            tracing::error!("Storage ping failed: {}", e);
            map_mysql_error(e)
        })?;
        drop(conn);
        Ok(())
    }

    /// Execute a query and return named columns plus typed rows.
    /// Column names are kept even when no rows come back.
    pub async fn query_raw(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        let mut conn = self.get_conn().await?;
        let start = std::time::Instant::now();

        let mut result = conn.query_iter(sql).await.map_err(|e| {
            tracing::error!("MySQL query execution failed: {}", e);
            map_mysql_error(e)
        })?;

        let columns: Arc<[Column]> = result.columns().unwrap_or_else(|| Arc::from(Vec::new()));
        let rows: Vec<mysql_async::Row> = result.collect().await.map_err(|e| {
            tracing::error!("MySQL result fetch failed: {}", e);
            map_mysql_error(e)
        })?;
        drop(result);

        // Explicitly drop connection to return it to the pool
        drop(conn);

        tracing::debug!("SQL: '{}' -> {} rows in {}ms", sql, rows.len(), start.elapsed().as_millis());

        Ok(process_query_result(&columns, rows))
    }
}

#[async_trait]
impl QueryExecutor for MySQLClient {
    async fn execute(&self, sql: &str) -> Result<ResultSet, ExecutionError> {
        self.query_raw(sql).await
    }
}

/// Server errors mean the query itself was refused; everything else is a transport problem
fn map_mysql_error(err: mysql_async::Error) -> ExecutionError {
    match err {
        mysql_async::Error::Server(e) => {
            ExecutionError::Rejected(format!("ERROR {} ({}): {}", e.code, e.state, e.message))
        },
        other => ExecutionError::Connectivity(other.to_string()),
    }
}

fn process_query_result(columns: &[Column], rows: Vec<mysql_async::Row>) -> ResultSet {
    let names: Vec<String> = columns.iter().map(|c| c.name_str().to_string()).collect();
    let types: Vec<ColumnType> = columns.iter().map(|c| c.column_type()).collect();

    let mut result_rows = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let cells = (0..row.len())
            .map(|idx| {
                row.as_ref(idx)
                    .map_or(Cell::Null, |value| value_to_cell(value, types.get(idx).copied()))
            })
            .collect();
        result_rows.push(cells);
    }

    ResultSet::new(names, result_rows)
}

fn is_integer_type(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::MYSQL_TYPE_TINY
            | ColumnType::MYSQL_TYPE_SHORT
            | ColumnType::MYSQL_TYPE_LONG
            | ColumnType::MYSQL_TYPE_INT24
            | ColumnType::MYSQL_TYPE_LONGLONG
            | ColumnType::MYSQL_TYPE_YEAR
    )
}

fn is_float_type(ty: ColumnType) -> bool {
    matches!(
        ty,
        ColumnType::MYSQL_TYPE_FLOAT
            | ColumnType::MYSQL_TYPE_DOUBLE
            | ColumnType::MYSQL_TYPE_DECIMAL
            | ColumnType::MYSQL_TYPE_NEWDECIMAL
    )
}

/// Text-protocol values arrive as bytes; numeric columns are parsed back into numbers
fn bytes_to_cell(bytes: &[u8], ty: Option<ColumnType>) -> Cell {
    let text = String::from_utf8_lossy(bytes);
    match ty {
        Some(ty) if is_integer_type(ty) => text
            .parse::<i64>()
            .map(Cell::Int)
            .or_else(|_| text.parse::<u64>().map(Cell::UInt))
            .unwrap_or_else(|_| Cell::Text(text.into_owned())),
        Some(ty) if is_float_type(ty) => match text.parse::<f64>() {
            Ok(v) if v.is_nan() => Cell::Null,
            Ok(v) => Cell::Float(v),
            Err(_) => Cell::Text(text.into_owned()),
        },
        _ => Cell::Text(text.into_owned()),
    }
}

fn value_to_cell(value: &mysql_async::Value, ty: Option<ColumnType>) -> Cell {
    match value {
        mysql_async::Value::NULL => Cell::Null,
        mysql_async::Value::Bytes(bytes) => bytes_to_cell(bytes, ty),
        mysql_async::Value::Int(i) => Cell::Int(*i),
        mysql_async::Value::UInt(u) => Cell::UInt(*u),
        mysql_async::Value::Float(f) => Cell::Float(f64::from(*f)),
        mysql_async::Value::Double(d) => Cell::Float(*d),
        mysql_async::Value::Date(year, month, day, hour, minute, second, _micro) => {
            Cell::Text(format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            ))
        },
        mysql_async::Value::Time(neg, days, hours, minutes, seconds, _micro) => {
            let total_hours = days * 24 + u32::from(*hours);
            let sign = if *neg { "-" } else { "" };
            Cell::Text(format!("{}{}:{:02}:{:02}", sign, total_hours, minutes, seconds))
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mysql_async::Value;

    #[test]
    fn test_text_protocol_numbers_are_parsed() {
        assert_eq!(
            bytes_to_cell(b"42", Some(ColumnType::MYSQL_TYPE_LONGLONG)),
            Cell::Int(42)
        );
        assert_eq!(
            bytes_to_cell(b"18446744073709551615", Some(ColumnType::MYSQL_TYPE_LONGLONG)),
            Cell::UInt(u64::MAX)
        );
        assert_eq!(
            bytes_to_cell(b"0.25", Some(ColumnType::MYSQL_TYPE_DOUBLE)),
            Cell::Float(0.25)
        );
        assert_eq!(bytes_to_cell(b"nan", Some(ColumnType::MYSQL_TYPE_DOUBLE)), Cell::Null);
        assert_eq!(
            bytes_to_cell(b"chinatelecom", Some(ColumnType::MYSQL_TYPE_VAR_STRING)),
            Cell::Text("chinatelecom".to_string())
        );
    }

    #[test]
    fn test_binary_values_map_to_cells() {
        assert_eq!(value_to_cell(&Value::NULL, None), Cell::Null);
        assert_eq!(value_to_cell(&Value::Int(-3), None), Cell::Int(-3));
        assert_eq!(value_to_cell(&Value::Double(1.5), None), Cell::Float(1.5));
        assert_eq!(
            value_to_cell(&Value::Date(2024, 1, 2, 3, 4, 5, 0), None),
            Cell::Text("2024-01-02 03:04:05".to_string())
        );
        assert_eq!(
            value_to_cell(&Value::Time(true, 1, 2, 3, 4, 0), None),
            Cell::Text("-26:03:04".to_string())
        );
    }

    #[tokio::test]
    async fn test_ping_unreachable_server_is_connectivity_error() {
        let config = StorageConfig {
            port: 1,
            connect_timeout_secs: 2,
            ..StorageConfig::default()
        };
        let client = MySQLClient::new(&config).unwrap();

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, ExecutionError::Connectivity(_)), "unexpected error: {err:?}");
    }
}
