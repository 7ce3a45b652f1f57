use async_trait::async_trait;
use sqlx::QueryBuilder;

use super::schema::Database;
use super::types::{
    PageToken, Partition, PostRecord, PostSummary, RecordPage, RecordQuery, RecordStore,
    StoreError, TokenPosition,
};

/// Internal row type for full post reads (used by sqlx FromRow)
#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    source: String,
    timest: i64,
    guid: String,
    datestr: String,
    title: String,
    description: String,
    fulltxt: String,
    rawhtml: String,
    link: String,
    author: String,
    tag: String,
    categories: String,
    visible: String,
}

impl PostRow {
    fn into_record(self) -> PostRecord {
        PostRecord {
            source: self.source,
            timestamp: self.timest,
            guid: self.guid,
            date: self.datestr,
            title: self.title,
            description: self.description,
            full_text: self.fulltxt,
            raw_html: self.rawhtml,
            link: self.link,
            author: self.author,
            tags: self.tag,
            categories: self.categories,
            visible: self.visible == "y",
        }
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn put_post(&self, record: &PostRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO posts (source, timest, guid, datestr, title, description, fulltxt,
                               rawhtml, link, author, tag, lower_tag, categories, visible)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source, guid) DO UPDATE SET
                timest = excluded.timest,
                datestr = excluded.datestr,
                title = excluded.title,
                description = excluded.description,
                fulltxt = excluded.fulltxt,
                rawhtml = excluded.rawhtml,
                link = excluded.link,
                author = excluded.author,
                tag = excluded.tag,
                lower_tag = excluded.lower_tag,
                categories = excluded.categories,
                visible = excluded.visible
        "#,
        )
        .bind(&record.source)
        .bind(record.timestamp)
        .bind(&record.guid)
        .bind(&record.date)
        .bind(&record.title)
        .bind(&record.description)
        .bind(&record.full_text)
        .bind(&record.raw_html)
        .bind(&record.link)
        .bind(&record.author)
        .bind(&record.tags)
        .bind(record.lower_tags())
        .bind(&record.categories)
        .bind(if record.visible { "y" } else { "n" })
        .execute(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(())
    }

    async fn query_page(
        &self,
        query: &RecordQuery,
        start: Option<&PageToken>,
    ) -> Result<RecordPage, StoreError> {
        let limit = query.limit.max(1);

        let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
            "SELECT source, timest AS timestamp, guid, datestr AS date, title, author, link, description \
             FROM posts WHERE ",
        );

        match &query.partition {
            Partition::Source(source) => {
                builder.push("source = ");
                builder.push_bind(source.as_str());
            }
            Partition::Visible => {
                builder.push("visible = 'y'");
            }
        }

        builder.push(" AND timest > ");
        builder.push_bind(query.since);

        if let Some(token) = start {
            let position = token.decode()?;
            builder.push(" AND (timest, source, guid) > (");
            builder.push_bind(position.timestamp);
            builder.push(", ");
            builder.push_bind(position.source);
            builder.push(", ");
            builder.push_bind(position.guid);
            builder.push(")");
        }

        builder.push(" ORDER BY timest, source, guid LIMIT ");
        builder.push_bind(i64::from(limit));

        let items: Vec<PostSummary> = builder
            .build_query_as::<PostSummary>()
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;

        // A full page may have more behind it; a short page is the last one
        let next = match items.last() {
            Some(last) if items.len() >= limit as usize => Some(PageToken::encode(&TokenPosition {
                timestamp: last.timestamp,
                source: last.source.clone(),
                guid: last.guid.clone(),
            })?),
            _ => None,
        };

        tracing::trace!(
            partition = ?query.partition,
            since = query.since,
            items = items.len(),
            has_more = next.is_some(),
            "Record store page read"
        );

        Ok(RecordPage { items, next })
    }
}

impl Database {
    /// Get a single post by its category label and guid.
    pub async fn get_post(&self, source: &str, guid: &str) -> Result<Option<PostRecord>, StoreError> {
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT source, timest, guid, datestr, title, description, fulltxt, rawhtml,
                   link, author, tag, categories, visible
            FROM posts
            WHERE source = ? AND guid = ?
        "#,
        )
        .bind(source)
        .bind(guid)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(row.map(PostRow::into_record))
    }

    /// Count the posts stored under a category label.
    pub async fn count_posts(&self, source: &str) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts WHERE source = ?")
            .bind(source)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from_sqlx)?;
        Ok(count)
    }

    /// Find posts whose detected entities contain `tag`, ignoring case.
    pub async fn find_by_tag(&self, tag: &str) -> Result<Vec<PostRecord>, StoreError> {
        let pattern = format!("%{}%", tag.to_lowercase());
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT source, timest, guid, datestr, title, description, fulltxt, rawhtml,
                   link, author, tag, categories, visible
            FROM posts
            WHERE lower_tag LIKE ?
            ORDER BY timest DESC
        "#,
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from_sqlx)?;

        Ok(rows.into_iter().map(PostRow::into_record).collect())
    }
}
