//! PostgreSQL driver built on tokio-postgres.

use async_trait::async_trait;
use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls, Row};

use super::{Connection, ConnectionError, ConnectionResult, QueryResult, SqlRow, SqlValue};

/// A PostgreSQL session.
///
/// The socket is driven by a task spawned on the current runtime; it ends
/// when the client is dropped.
pub struct PgConnection {
    client: Client,
}

impl PgConnection {
    /// Connect using a libpq-style URL or key/value string, without TLS.
    pub async fn connect(url: &str) -> ConnectionResult<Self> {
        let (client, connection) = tokio_postgres::connect(url, NoTls).await?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "postgres connection terminated");
            }
        });
        tracing::debug!("opened postgres connection");
        Ok(Self { client })
    }

    /// The underlying tokio-postgres client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

#[async_trait]
impl Connection for PgConnection {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<u64> {
        Ok(self.client.execute(sql, &param_refs(params)).await?)
    }

    async fn query(&self, sql: &str, params: &[SqlValue]) -> ConnectionResult<QueryResult> {
        let rows = self.client.query(sql, &param_refs(params)).await?;
        let rows = rows.iter().map(decode_row).collect::<ConnectionResult<Vec<_>>>()?;
        Ok(QueryResult::new(rows))
    }

    async fn batch_execute(&self, sql: &str) -> ConnectionResult<()> {
        Ok(self.client.batch_execute(sql).await?)
    }
}

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn decode_row(row: &Row) -> ConnectionResult<SqlRow> {
    let columns: Vec<String> = row.columns().iter().map(|c| c.name().to_string()).collect();
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in row.columns().iter().enumerate() {
        values.push(decode_value(row, i, column.type_())?);
    }
    Ok(SqlRow::new(columns, values))
}

fn decode_value(row: &Row, i: usize, ty: &Type) -> ConnectionResult<SqlValue> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(i)?.map(SqlValue::Bool),
        Type::INT2 => row.try_get::<_, Option<i16>>(i)?.map(|v| SqlValue::Int(v.into())),
        Type::INT4 => row.try_get::<_, Option<i32>>(i)?.map(|v| SqlValue::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(i)?.map(SqlValue::Int),
        Type::FLOAT4 => row.try_get::<_, Option<f32>>(i)?.map(|v| SqlValue::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(i)?.map(SqlValue::Float),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(i)?.map(SqlValue::Blob),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => {
            row.try_get::<_, Option<String>>(i)?.map(SqlValue::Text)
        }
        _ => {
            return Err(ConnectionError::TypeConversion(format!(
                "unsupported column type {} at index {}",
                ty, i
            )))
        }
    };
    Ok(value.unwrap_or(SqlValue::Null))
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(b) => b.to_sql(ty, out),
            SqlValue::Int(i) => match *ty {
                Type::INT2 => i16::try_from(*i)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*i)?.to_sql(ty, out),
                Type::FLOAT8 => (*i as f64).to_sql(ty, out),
                _ => i.to_sql(ty, out),
            },
            SqlValue::Float(f) => match *ty {
                Type::FLOAT4 => (*f as f32).to_sql(ty, out),
                _ => f.to_sql(ty, out),
            },
            SqlValue::Text(s) => s.to_sql(ty, out),
            SqlValue::Blob(b) => b.as_slice().to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}
