use std::time::Duration;

use flume::{Receiver, Sender};
use sea_query::{
    Alias as SeaAlias, ColumnDef, Expr as SeaExpr, Func as SeaFunc, Iden, Index, Order as SeaOrder, PostgresQueryBuilder, Query as SeaQuery, Table,
};
use sea_query_binder::SqlxBinder;
use sqlx::{Error as DbError, Row, postgres::PgRow};
use tokio::{runtime::Handle, time::MissedTickBehavior};
use tracing::warn;

use crate::{
    ChatflowError, Result,
    store::{
        DbCollection, PageData, data,
        db::postgres::{DbInit, DbRow},
        query,
    },
    utils,
};

use super::{DbConnection, into_query, map_db_err};

#[derive(Debug)]
pub struct LogCollection {
    conn: DbConnection,

    batch_tx: Sender<data::Log>,
    batch_rx: Receiver<data::Log>,

    runtime: Handle,
}

#[derive(Iden)]
#[iden = "logs"]
enum CollectionIden {
    Table,

    Id,
    Sid,
    Nid,
    Content,
    Timestamp,
}

impl DbCollection for LogCollection {
    type Item = data::Log;

    fn exists(
        &self,
        _: &str,
    ) -> Result<bool> {
        Err(ChatflowError::Store("logs are append-only".to_string()))
    }

    fn find(
        &self,
        _: &str,
    ) -> Result<Self::Item> {
        Err(ChatflowError::Store("logs are append-only".to_string()))
    }

    fn query(
        &self,
        q: &query::Query,
    ) -> Result<PageData<Self::Item>> {
        let filter = into_query(q);

        let mut count_query = SeaQuery::select();
        count_query.from(CollectionIden::Table).expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)));

        let mut query = SeaQuery::select();
        query
            .columns([CollectionIden::Id, CollectionIden::Sid, CollectionIden::Nid, CollectionIden::Content, CollectionIden::Timestamp])
            .from(CollectionIden::Table);

        if !filter.is_empty() {
            count_query.cond_where(filter.clone());
            query.cond_where(filter);
        }

        for (order, rev) in q.order_by().iter() {
            query.order_by(
                SeaAlias::new(order),
                if *rev {
                    SeaOrder::Desc
                } else {
                    SeaOrder::Asc
                },
            );
        }
        let (sql, values) = query.limit(q.limit() as u64).offset(q.offset() as u64).build_sqlx(PostgresQueryBuilder);

        let (count_sql, count_values) = count_query.build_sqlx(PostgresQueryBuilder);
        let count = self.conn.query_one(count_sql.as_str(), count_values).map_err(map_db_err)?.get::<i64, usize>(0) as usize;
        Ok(PageData {
            count,
            page_size: q.limit(),
            page_num: q.offset() / q.limit() + 1,
            page_count: count.div_ceil(q.limit()),
            rows: self.conn.query(&sql, values).map_err(map_db_err)?.iter().map(Self::Item::from_row).collect::<std::result::Result<Vec<_>, _>>().map_err(map_db_err)?,
        })
    }

    fn create(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        self.batch_tx.send(data.clone()).map_err(map_db_err)?;
        Ok(true)
    }

    fn update(
        &self,
        _: &Self::Item,
    ) -> Result<bool> {
        Err(ChatflowError::Store("logs are append-only".to_string()))
    }

    fn delete(
        &self,
        id: &str,
    ) -> Result<bool> {
        let (sql, values) =
            SeaQuery::delete().from_table(CollectionIden::Table).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }
}

impl DbRow for data::Log {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            sid: row.try_get("sid")?,
            nid: row.try_get("nid")?,
            content: row.try_get("content")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

impl DbInit for LogCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::Sid).string().not_null())
                .col(ColumnDef::new(CollectionIden::Nid).string().not_null())
                .col(ColumnDef::new(CollectionIden::Content).text().default(""))
                .col(ColumnDef::new(CollectionIden::Timestamp).big_integer().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_logs_sid").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Sid).build(PostgresQueryBuilder),
            Index::create().name("idx_logs_nid").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Nid).build(PostgresQueryBuilder),
        ];
        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl LogCollection {
    /// Batch size for inserting log records
    const BATCH_SIZE: usize = 1000;
    /// Timeout for flushing the batch
    const TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(
        conn: &DbConnection,
        runtime: Handle,
    ) -> Self {
        let (batch_tx, batch_rx) = flume::bounded(1024);
        let collection = Self {
            conn: conn.clone(),
            batch_tx,
            batch_rx,
            runtime,
        };
        collection.watch_batch();
        collection
    }

    fn watch_batch(&self) {
        let rx = self.batch_rx.clone();
        let conn = self.conn.clone();
        self.runtime.spawn(async move {
            let mut batch = Vec::with_capacity(Self::BATCH_SIZE);
            let mut interval = tokio::time::interval(Self::TIMEOUT);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut latest_insert = 0;

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let now = utils::time::time_millis();
                        if now - latest_insert >= Self::TIMEOUT.as_millis() as i64 && !batch.is_empty() {
                            let items = std::mem::take(&mut batch);
                            Self::batch_logs(conn.clone(), items);

                            latest_insert = now;
                        }
                    }
                    msg = rx.recv_async() => {
                        let Ok(log) = msg else {
                            // every sender is gone, flush what is left
                            if !batch.is_empty() {
                                Self::batch_logs(conn.clone(), std::mem::take(&mut batch));
                            }
                            break;
                        };
                        if batch.len() >= Self::BATCH_SIZE {
                            let items = std::mem::take(&mut batch);
                            Self::batch_logs(conn.clone(), items);

                            latest_insert = utils::time::time_millis();
                        }

                        batch.push(log);
                    }
                }
            }
        });
    }

    fn batch_logs(
        conn: DbConnection,
        items: Vec<data::Log>,
    ) {
        let mut binding = SeaQuery::insert();
        let stmt = binding.into_table(CollectionIden::Table).columns([
            CollectionIden::Id,
            CollectionIden::Sid,
            CollectionIden::Nid,
            CollectionIden::Content,
            CollectionIden::Timestamp,
        ]);

        for item in items {
            if let Err(e) = stmt.values(vec![item.id.into(), item.sid.into(), item.nid.into(), item.content.into(), item.timestamp.into()]) {
                warn!("failed to build log record: {:?}", e);
            }
        }

        let (sql, values) = stmt.build_sqlx(PostgresQueryBuilder);

        if let Err(e) = conn.execute(sql.as_str(), values) {
            warn!("failed to insert log records: {:?}", e);
        }
    }
}
