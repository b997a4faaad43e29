use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::client::Waiters;
use aws_sdk_dynamodb::error::{BuildError, DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::transact_write_items::TransactWriteItemsError;
use aws_sdk_dynamodb::types::{
    AttributeDefinition, AttributeValue, BillingMode, Delete, KeySchemaElement, KeyType, Put,
    ScalarAttributeType, TimeToLiveSpecification, TransactWriteItem,
};
use aws_sdk_dynamodb::Client;
use chrono::{DateTime, Utc};
use common::DynamoConfig;

use super::{SessionRecord, SessionStore, StoreResult};
use crate::error::StoreError;

const KEY_ATTR: &str = "key";
const VALUE_ATTR: &str = "value";
// Epoch seconds, also the table's native TTL attribute
const EXPIRES_ATTR: &str = "expires_at";

const TABLE_READY_WAIT: Duration = Duration::from_secs(60);

/// Session store backed by a DynamoDB table.
///
/// One item per token: `key` (partition key), `value` (the record as JSON)
/// and `expires_at`. DynamoDB's TTL sweep is lazy, so `expires_at` is also
/// checked on every read.
#[derive(Clone)]
pub struct DynamoStore {
    client: Client,
    table_name: String,
}

impl DynamoStore {
    /// Resolves credentials and region settings; does not contact DynamoDB.
    pub async fn connect(config: &DynamoConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .timeout_config(TimeoutConfig::builder().operation_timeout(config.timeout).build());
        if let Some(url) = &config.endpoint_url {
            loader = loader.endpoint_url(url);
        }

        Self::with_client(Client::new(&loader.load().await), config.table_name.clone())
    }

    pub fn with_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Creates the session table if it does not exist yet and waits for it
    /// to become active.
    pub async fn ensure_table(&self) -> StoreResult<()> {
        match self.client.describe_table().table_name(&self.table_name).send().await {
            Ok(_) => return Ok(()),
            Err(e) if e.code() == Some("ResourceNotFoundException") => {}
            Err(e) => return Err(store_error(e)),
        }

        tracing::info!("Creating DynamoDB table {}", self.table_name);
        self.client
            .create_table()
            .table_name(&self.table_name)
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name(KEY_ATTR)
                    .attribute_type(ScalarAttributeType::S)
                    .build()
                    .map_err(build_error)?,
            )
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name(KEY_ATTR)
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(build_error)?,
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(store_error)?;

        self.client
            .wait_until_table_exists()
            .table_name(&self.table_name)
            .wait(TABLE_READY_WAIT)
            .await
            .map_err(|e| StoreError::Unavailable(DisplayErrorContext(&e).to_string()))?;

        // Reads already filter expired items; the native sweep only reclaims space
        let ttl = TimeToLiveSpecification::builder()
            .attribute_name(EXPIRES_ATTR)
            .enabled(true)
            .build()
            .map_err(build_error)?;
        if let Err(e) = self
            .client
            .update_time_to_live()
            .table_name(&self.table_name)
            .time_to_live_specification(ttl)
            .send()
            .await
        {
            tracing::warn!("Could not enable TTL on {}: {}", self.table_name, DisplayErrorContext(&e));
        }

        Ok(())
    }

    fn item(token: &str, record: &SessionRecord, ttl: Duration) -> StoreResult<HashMap<String, AttributeValue>> {
        let value = serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let expires_at = common::time::deadline(common::time::now(), ttl);

        Ok(HashMap::from([
            (KEY_ATTR.to_string(), AttributeValue::S(token.to_string())),
            (VALUE_ATTR.to_string(), AttributeValue::S(value)),
            (EXPIRES_ATTR.to_string(), AttributeValue::N(epoch_secs_ceil(expires_at).to_string())),
        ]))
    }
}

#[async_trait]
impl SessionStore for DynamoStore {
    async fn put(&self, token: &str, record: &SessionRecord, ttl: Duration) -> StoreResult<()> {
        if ttl.is_zero() {
            return self.delete(token).await;
        }

        self.client
            .put_item()
            .table_name(&self.table_name)
            .set_item(Some(Self::item(token, record, ttl)?))
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn get(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(KEY_ATTR, AttributeValue::S(token.to_string()))
            .consistent_read(true)
            .send()
            .await
            .map_err(store_error)?;

        match output.item() {
            Some(item) => decode_item(item, common::time::now()),
            None => Ok(None),
        }
    }

    async fn delete(&self, token: &str) -> StoreResult<()> {
        self.client
            .delete_item()
            .table_name(&self.table_name)
            .key(KEY_ATTR, AttributeValue::S(token.to_string()))
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn replace(
        &self,
        old_token: &str,
        new_token: &str,
        record: &SessionRecord,
        ttl: Duration,
    ) -> StoreResult<bool> {
        if ttl.is_zero() {
            self.delete(old_token).await?;
            return Ok(false);
        }

        let put = Put::builder()
            .table_name(&self.table_name)
            .set_item(Some(Self::item(new_token, record, ttl)?))
            .build()
            .map_err(build_error)?;
        // The old item must still be live; otherwise the whole transaction is cancelled
        let delete = Delete::builder()
            .table_name(&self.table_name)
            .key(KEY_ATTR, AttributeValue::S(old_token.to_string()))
            .condition_expression("attribute_exists(#k) AND #e > :now")
            .expression_attribute_names("#k", KEY_ATTR)
            .expression_attribute_names("#e", EXPIRES_ATTR)
            .expression_attribute_values(":now", AttributeValue::N(common::time::timestamp().to_string()))
            .build()
            .map_err(build_error)?;

        let result = self
            .client
            .transact_write_items()
            .transact_items(TransactWriteItem::builder().put(put).build())
            .transact_items(TransactWriteItem::builder().delete(delete).build())
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(e) if is_condition_failure(&e) => Ok(false),
            Err(e) => Err(store_error(e)),
        }
    }

    async fn ping(&self) -> StoreResult<()> {
        self.client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(store_error)?;
        Ok(())
    }
}

fn decode_item(item: &HashMap<String, AttributeValue>, now: DateTime<Utc>) -> StoreResult<Option<SessionRecord>> {
    let expires_at = item
        .get(EXPIRES_ATTR)
        .and_then(|v| v.as_n().ok())
        .and_then(|n| n.parse::<i64>().ok())
        .ok_or_else(|| StoreError::Serialization(format!("missing or invalid {}", EXPIRES_ATTR)))?;
    if expires_at <= now.timestamp() {
        return Ok(None);
    }

    let value = item
        .get(VALUE_ATTR)
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| StoreError::Serialization(format!("missing {}", VALUE_ATTR)))?;
    let record = serde_json::from_str(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(Some(record))
}

// Rounded up so an item is never dropped before its record's deadline
fn epoch_secs_ceil(at: DateTime<Utc>) -> i64 {
    let secs = at.timestamp();
    if at.timestamp_subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

fn is_condition_failure<R>(err: &SdkError<TransactWriteItemsError, R>) -> bool {
    match err.as_service_error() {
        Some(TransactWriteItemsError::TransactionCanceledException(cancelled)) => cancelled
            .cancellation_reasons()
            .iter()
            .any(|reason| reason.code() == Some("ConditionalCheckFailed")),
        _ => false,
    }
}

fn store_error<E, R>(err: SdkError<E, R>) -> StoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let rejected = matches!(err.code(), Some("ValidationException" | "SerializationException"));
    let message = DisplayErrorContext(&err).to_string();

    if rejected {
        StoreError::Rejected(message)
    } else {
        StoreError::Unavailable(message)
    }
}

fn build_error(err: BuildError) -> StoreError {
    StoreError::Rejected(err.to_string())
}
