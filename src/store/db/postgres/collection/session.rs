use sea_query::{
    Alias as SeaAlias, ColumnDef, Expr as SeaExpr, Func as SeaFunc, Iden, Index, Order as SeaOrder, PostgresQueryBuilder, Query as SeaQuery, Table,
};
use sea_query_binder::SqlxBinder;
use sqlx::{Error as DbError, Row, postgres::PgRow};

use crate::{
    Result,
    store::{
        DbCollection, PageData, data,
        db::postgres::{DbInit, DbRow},
        query,
    },
};

use super::{DbConnection, into_query, map_db_err};

#[derive(Debug)]
pub struct SessionCollection {
    conn: DbConnection,
}

#[derive(Iden)]
#[iden = "sessions"]
enum CollectionIden {
    Table,

    Id,
    FlowId,
    FlowVersion,
    Status,
    Variables,
    Messages,
    CurrentNodeId,
    PendingNodeId,
    Queue,
    AgentId,
    Halt,
    CreateTime,
    UpdateTime,
}

const COLUMNS: [CollectionIden; 13] = [
    CollectionIden::Id,
    CollectionIden::FlowId,
    CollectionIden::FlowVersion,
    CollectionIden::Status,
    CollectionIden::Variables,
    CollectionIden::Messages,
    CollectionIden::CurrentNodeId,
    CollectionIden::PendingNodeId,
    CollectionIden::Queue,
    CollectionIden::AgentId,
    CollectionIden::Halt,
    CollectionIden::CreateTime,
    CollectionIden::UpdateTime,
];

impl DbCollection for SessionCollection {
    type Item = data::Session;

    fn exists(
        &self,
        id: &str,
    ) -> Result<bool> {
        let (sql, values) = SeaQuery::select()
            .from(CollectionIden::Table)
            .expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)))
            .and_where(SeaExpr::col(CollectionIden::Id).eq(id))
            .build_sqlx(PostgresQueryBuilder);

        let count = self.conn.query_one(sql.as_str(), values).map(|row| row.get::<i64, usize>(0)).map_err(map_db_err)?;

        Ok(count > 0)
    }

    fn find(
        &self,
        id: &str,
    ) -> Result<Self::Item> {
        let (sql, values) =
            SeaQuery::select().from(CollectionIden::Table).columns(COLUMNS).and_where(SeaExpr::col(CollectionIden::Id).eq(id)).build_sqlx(PostgresQueryBuilder);
        let row = self.conn.query_one(&sql, values).map_err(map_db_err)?;
        Self::Item::from_row(&row).map_err(map_db_err)
    }

    fn query(
        &self,
        q: &query::Query,
    ) -> Result<PageData<Self::Item>> {
        let filter = into_query(q);

        let mut count_query = SeaQuery::select();
        count_query.from(CollectionIden::Table).expr(SeaFunc::count(SeaExpr::col(CollectionIden::Id)));

        let mut query = SeaQuery::select();
        query.columns(COLUMNS).from(CollectionIden::Table);

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
        let data = data.clone();
        let (sql, sql_values) = SeaQuery::insert()
            .into_table(CollectionIden::Table)
            .columns(COLUMNS)
            .values([
                data.id.into(),
                data.flow_id.into(),
                data.flow_version.into(),
                data.status.into(),
                data.variables.into(),
                data.messages.into(),
                data.current_node_id.into(),
                data.pending_node_id.into(),
                data.queue.into(),
                data.agent_id.into(),
                data.halt.into(),
                data.create_time.into(),
                data.update_time.into(),
            ])
            .map_err(map_db_err)?
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
    }

    fn update(
        &self,
        data: &Self::Item,
    ) -> Result<bool> {
        let model = data.clone();
        let (sql, sql_values) = SeaQuery::update()
            .table(CollectionIden::Table)
            .values([
                (CollectionIden::FlowVersion, model.flow_version.into()),
                (CollectionIden::Status, model.status.into()),
                (CollectionIden::Variables, model.variables.into()),
                (CollectionIden::Messages, model.messages.into()),
                (CollectionIden::CurrentNodeId, model.current_node_id.into()),
                (CollectionIden::PendingNodeId, model.pending_node_id.into()),
                (CollectionIden::Queue, model.queue.into()),
                (CollectionIden::AgentId, model.agent_id.into()),
                (CollectionIden::Halt, model.halt.into()),
                (CollectionIden::UpdateTime, model.update_time.into()),
            ])
            .and_where(SeaExpr::col(CollectionIden::Id).eq(data.id()))
            .build_sqlx(PostgresQueryBuilder);

        let result = self.conn.execute(sql.as_str(), sql_values).map_err(map_db_err)?;
        Ok(result.rows_affected() > 0)
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

impl DbRow for data::Session {
    fn id(&self) -> &str {
        &self.id
    }

    fn from_row(row: &PgRow) -> std::result::Result<Self, DbError>
    where
        Self: Sized,
    {
        Ok(Self {
            id: row.try_get("id")?,
            flow_id: row.try_get("flow_id")?,
            flow_version: row.try_get("flow_version")?,
            status: row.try_get("status")?,
            variables: row.try_get("variables")?,
            messages: row.try_get("messages")?,
            current_node_id: row.try_get("current_node_id")?,
            pending_node_id: row.try_get("pending_node_id")?,
            queue: row.try_get("queue")?,
            agent_id: row.try_get("agent_id")?,
            halt: row.try_get("halt")?,
            create_time: row.try_get("create_time")?,
            update_time: row.try_get("update_time")?,
        })
    }
}

impl DbInit for SessionCollection {
    fn init(&self) -> Result<()> {
        let sql = [
            Table::create()
                .table(CollectionIden::Table)
                .if_not_exists()
                .col(ColumnDef::new(CollectionIden::Id).string().not_null().primary_key())
                .col(ColumnDef::new(CollectionIden::FlowId).string().not_null())
                .col(ColumnDef::new(CollectionIden::FlowVersion).big_integer().default(0))
                .col(ColumnDef::new(CollectionIden::Status).string().not_null())
                .col(ColumnDef::new(CollectionIden::Variables).text().not_null())
                .col(ColumnDef::new(CollectionIden::Messages).text().not_null())
                .col(ColumnDef::new(CollectionIden::CurrentNodeId).string())
                .col(ColumnDef::new(CollectionIden::PendingNodeId).string())
                .col(ColumnDef::new(CollectionIden::Queue).string())
                .col(ColumnDef::new(CollectionIden::AgentId).string())
                .col(ColumnDef::new(CollectionIden::Halt).text())
                .col(ColumnDef::new(CollectionIden::CreateTime).big_integer().default(0))
                .col(ColumnDef::new(CollectionIden::UpdateTime).big_integer().default(0))
                .build(PostgresQueryBuilder),
            Index::create().name("idx_sessions_flow_id").if_not_exists().table(CollectionIden::Table).col(CollectionIden::FlowId).build(PostgresQueryBuilder),
            Index::create().name("idx_sessions_status").if_not_exists().table(CollectionIden::Table).col(CollectionIden::Status).build(PostgresQueryBuilder),
        ];

        self.conn.batch_execute(&sql).map_err(map_db_err)
    }
}

impl SessionCollection {
    pub fn new(conn: &DbConnection) -> Self {
        Self {
            conn: conn.clone(),
        }
    }
}
