use std::{future::Future, time::Duration};

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use bb8_redis::RedisConnectionManager;
use redis::{AsyncCommands, RedisError, Script};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::redis::{KeyPart, RedisKey},
    query::{Filter, FindQuery},
    store::{
        Collection, Document, DocumentStore, VERSION_FIELD, document_id, eval,
        pipeline::Pipeline, strip_reserved, unique_values,
    },
};

pub type RedisClient = Pool<RedisConnectionManager>;

type Conn<'a> = PooledConnection<'a, RedisConnectionManager>;

// Merges a JSON patch into a stored document in one step, moving the
// secondary index entry and the unique-pair claim when their fields change.
// KEYS[1] document key
// ARGV: patch, id, index field, index prefix, unique first, unique second, unique prefix
const UPDATE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return false end
local doc = cjson.decode(raw)
local patch = cjson.decode(ARGV[1])

local old_index = nil
if ARGV[3] ~= '' then old_index = doc[ARGV[3]] end
local old_first, old_second = nil, nil
if ARGV[5] ~= '' then
  old_first = doc[ARGV[5]]
  old_second = doc[ARGV[6]]
end

for k, v in pairs(patch) do
  if k ~= 'id' and k ~= '__v' then doc[k] = v end
end
doc['__v'] = (tonumber(doc['__v']) or 0) + 1

if ARGV[5] ~= '' then
  local old_key = ARGV[7] .. tostring(old_first) .. ':' .. tostring(old_second)
  local new_key = ARGV[7] .. tostring(doc[ARGV[5]]) .. ':' .. tostring(doc[ARGV[6]])
  if old_key ~= new_key then
    if not redis.call('SET', new_key, ARGV[2], 'NX') then
      return redis.error_reply('DUPLICATE unique pair already taken')
    end
    redis.call('DEL', old_key)
  end
end

local encoded = cjson.encode(doc)
redis.call('SET', KEYS[1], encoded)

if ARGV[3] ~= '' then
  local new_index = doc[ARGV[3]]
  if old_index ~= new_index then
    if old_index then redis.call('SREM', ARGV[4] .. tostring(old_index), ARGV[2]) end
    if new_index then redis.call('SADD', ARGV[4] .. tostring(new_index), ARGV[2]) end
  end
end

return encoded
"#;

// Stores a new document together with its id-set entry, index entry and
// unique-pair claim, or nothing at all.
// KEYS[1] document key, KEYS[2] collection id set
// ARGV: body, id, index key, unique key ('' when the collection has none)
const INSERT_SCRIPT: &str = r#"
if ARGV[4] ~= '' and redis.call('EXISTS', ARGV[4]) == 1 then
  return redis.error_reply('DUPLICATE unique pair already taken')
end
if redis.call('EXISTS', KEYS[1]) == 1 then
  return redis.error_reply('EXISTS document id already taken')
end

redis.call('SET', KEYS[1], ARGV[1])
redis.call('SADD', KEYS[2], ARGV[2])
if ARGV[3] ~= '' then redis.call('SADD', ARGV[3], ARGV[2]) end
if ARGV[4] ~= '' then redis.call('SET', ARGV[4], ARGV[2]) end
return 1
"#;

// Removes a document and every key pointing at it.
// KEYS[1] document key, KEYS[2] collection id set
// ARGV: id, index field, index prefix, unique first, unique second, unique prefix
const DELETE_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if not raw then return false end
local doc = cjson.decode(raw)

redis.call('DEL', KEYS[1])
redis.call('SREM', KEYS[2], ARGV[1])
if ARGV[2] ~= '' and doc[ARGV[2]] then
  redis.call('SREM', ARGV[3] .. tostring(doc[ARGV[2]]), ARGV[1])
end
if ARGV[4] ~= '' then
  local claim = ARGV[6] .. tostring(doc[ARGV[4]]) .. ':' .. tostring(doc[ARGV[5]])
  if redis.call('GET', claim) == ARGV[1] then redis.call('DEL', claim) end
end
return raw
"#;

#[derive(Clone)]
pub struct RedisStore {
    redis: RedisClient,
    timeout: Duration,
    insert_script: Script,
    update_script: Script,
    delete_script: Script,
}

impl RedisStore {
    pub fn new(redis: RedisClient, timeout: Duration) -> Self {
        Self {
            redis,
            timeout,
            insert_script: Script::new(INSERT_SCRIPT),
            update_script: Script::new(UPDATE_SCRIPT),
            delete_script: Script::new(DELETE_SCRIPT),
        }
    }

    pub async fn connect(redis_url: &str, timeout: Duration) -> Result<Self, AppError> {
        let manager = RedisConnectionManager::new(redis_url).map_err(AppError::RedisCommandError)?;
        let pool = Pool::builder()
            .connection_timeout(timeout)
            .build(manager)
            .await
            .map_err(AppError::RedisCommandError)?;

        Ok(Self::new(pool, timeout))
    }

    async fn conn(&self) -> Result<Conn<'_>, AppError> {
        self.redis.get().await.map_err(|e| match e {
            bb8::RunError::User(err) => AppError::RedisCommandError(err),
            bb8::RunError::TimedOut => AppError::RedisPoolError("Redis connection timed out".into()),
        })
    }

    // Only the deadline is mapped; the command's own error is left to the caller
    async fn bounded_raw<T, F>(&self, op: &str, fut: F) -> Result<Result<T, RedisError>, AppError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        tokio::time::timeout(self.timeout, fut).await.map_err(|_| {
            tracing::warn!("Redis {} exceeded {:?}", op, self.timeout);
            AppError::Timeout(format!("Redis {} timed out", op))
        })
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, AppError>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        self.bounded_raw(op, fut)
            .await?
            .map_err(AppError::RedisCommandError)
    }

    // Narrows to the secondary index when the filter pins the indexed field
    async fn candidate_ids(
        &self,
        conn: &mut Conn<'_>,
        collection: Collection,
        filter: Option<&Filter>,
    ) -> Result<Vec<String>, AppError> {
        let indexed = collection.index_field().and_then(|field| {
            filter
                .and_then(|f| f.eq_value(field))
                .and_then(Value::as_str)
                .map(|value| RedisKey::index(collection, KeyPart::Str(value.to_string())))
        });
        let key = indexed.unwrap_or_else(|| RedisKey::collection_ids(collection));

        let ids: Vec<String> = self.bounded("SMEMBERS", conn.smembers(&key)).await?;
        Ok(ids)
    }

    async fn load(
        &self,
        conn: &mut Conn<'_>,
        collection: Collection,
        ids: Vec<String>,
    ) -> Result<Vec<Document>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids
            .into_iter()
            .map(|id| RedisKey::document(collection, KeyPart::Str(id)))
            .collect();

        let raw: Vec<Option<String>> = self
            .bounded(
                "MGET",
                redis::cmd("MGET").arg(&keys).query_async(&mut **conn),
            )
            .await?;

        // A missing body means a concurrent delete; skip it
        raw.into_iter()
            .flatten()
            .map(|json| parse_document(&json))
            .collect()
    }

    async fn load_matching(
        &self,
        collection: Collection,
        filter: Option<&Filter>,
    ) -> Result<Vec<Document>, AppError> {
        let mut conn = self.conn().await?;
        let ids = self.candidate_ids(&mut conn, collection, filter).await?;
        self.load(&mut conn, collection, ids).await
    }
}

fn parse_document(json: &str) -> Result<Document, AppError> {
    serde_json::from_str::<Document>(json)
        .map_err(|e| AppError::Deserialization(format!("Corrupt document in redis: {}", e)))
}

fn index_key(collection: Collection, doc: &Document) -> Option<String> {
    let field = collection.index_field()?;
    let value = doc.get(field)?.as_str()?;
    Some(RedisKey::index(collection, KeyPart::Str(value.to_string())))
}

fn unique_key(collection: Collection, doc: &Document) -> Option<String> {
    unique_values(collection, doc).map(|(first, second)| {
        RedisKey::unique_pair(collection, KeyPart::Str(first), KeyPart::Str(second))
    })
}

#[async_trait]
impl DocumentStore for RedisStore {
    async fn execute(&self, query: &FindQuery) -> Result<Vec<Document>, AppError> {
        let docs = self
            .load_matching(query.collection(), Some(query.filter()))
            .await?;
        Ok(eval::run_query(docs, query))
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, AppError> {
        let docs = self
            .load_matching(collection, pipeline.leading_match())
            .await?;
        Ok(eval::run_pipeline(docs, pipeline))
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        let mut conn = self.conn().await?;
        let key = RedisKey::document(collection, KeyPart::Id(id));

        let raw: Option<String> = self.bounded("GET", conn.get(&key)).await?;
        raw.as_deref().map(parse_document).transpose()
    }

    async fn insert(&self, collection: Collection, mut doc: Document) -> Result<Document, AppError> {
        let id = document_id(&doc).ok_or_else(|| {
            AppError::WriteFailure(format!("Document for {} has no id", collection.name()))
        })?;
        doc.entry(VERSION_FIELD.to_string())
            .or_insert_with(|| Value::from(0u64));
        let json = serde_json::to_string(&doc).map_err(|e| AppError::Serialization(e.to_string()))?;

        let mut conn = self.conn().await?;
        let result: Result<i64, RedisError> = self
            .bounded_raw(
                "EVALSHA",
                self.insert_script
                    .key(RedisKey::document(collection, KeyPart::Id(id)))
                    .key(RedisKey::collection_ids(collection))
                    .arg(&json)
                    .arg(id.to_string())
                    .arg(index_key(collection, &doc).unwrap_or_default())
                    .arg(unique_key(collection, &doc).unwrap_or_default())
                    .invoke_async(&mut *conn),
            )
            .await?;

        match result {
            Ok(_) => {}
            Err(e) if e.code() == Some("DUPLICATE") => {
                let (first, second) = unique_values(collection, &doc).unwrap_or_default();
                return Err(AppError::Conflict(format!(
                    "Duplicate field value: ({}, {}). Please use another value",
                    first, second
                )));
            }
            Err(e) if e.code() == Some("EXISTS") => {
                return Err(AppError::Conflict(format!(
                    "Duplicate id for {}: {}",
                    collection.name(),
                    id
                )));
            }
            Err(e) => return Err(AppError::RedisCommandError(e)),
        }

        Ok(doc)
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Document>, AppError> {
        let patch = serde_json::to_string(&strip_reserved(fields))
            .map_err(|e| AppError::Serialization(e.to_string()))?;
        let (first, second) = collection.unique_pair().unwrap_or(("", ""));

        let mut conn = self.conn().await?;
        let result: Result<Option<String>, RedisError> = self
            .bounded_raw(
                "EVALSHA",
                self.update_script
                    .key(RedisKey::document(collection, KeyPart::Id(id)))
                    .arg(patch)
                    .arg(id.to_string())
                    .arg(collection.index_field().unwrap_or(""))
                    .arg(RedisKey::index_prefix(collection))
                    .arg(first)
                    .arg(second)
                    .arg(RedisKey::unique_prefix(collection))
                    .invoke_async(&mut *conn),
            )
            .await?;

        match result {
            Ok(raw) => raw.as_deref().map(parse_document).transpose(),
            Err(e) if e.code() == Some("DUPLICATE") => Err(AppError::Conflict(
                "Duplicate field value. Please use another value".into(),
            )),
            Err(e) => Err(AppError::RedisCommandError(e)),
        }
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        let (first, second) = collection.unique_pair().unwrap_or(("", ""));

        let mut conn = self.conn().await?;
        let raw: Option<String> = self
            .bounded(
                "EVALSHA",
                self.delete_script
                    .key(RedisKey::document(collection, KeyPart::Id(id)))
                    .key(RedisKey::collection_ids(collection))
                    .arg(id.to_string())
                    .arg(collection.index_field().unwrap_or(""))
                    .arg(RedisKey::index_prefix(collection))
                    .arg(first)
                    .arg(second)
                    .arg(RedisKey::unique_prefix(collection))
                    .invoke_async(&mut *conn),
            )
            .await?;

        raw.as_deref().map(parse_document).transpose()
    }
}
