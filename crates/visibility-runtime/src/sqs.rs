//! AWS SQS client implementation using the query API over HTTPS.
//!
//! Speaks the SQS query protocol directly instead of going through the AWS
//! SDK so that unit tests can exercise request building and response parsing
//! without a live endpoint. Requests are signed with AWS Signature V4.
//!
//! Operations implemented:
//! - `ReceiveMessage` with all message and system attributes
//! - `ChangeMessageVisibilityBatch` with per-entry failure reporting
//! - `ChangeMessageVisibility` for single-entry repair
//! - `SendMessage` for the publisher endpoint

use crate::client::QueueClient;
use crate::error::QueueError;
use crate::message::{
    BatchExtensionOutcome, FailedExtension, MessageId, QueueUrl, ReceiptHandle, ReceiveRequest,
    ReceivedMessage, VisibilityExtension,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client as HttpClient;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;

#[cfg(test)]
#[path = "sqs_tests.rs"]
mod tests;

/// SQS query API version sent with every request
const API_VERSION: &str = "2012-11-05";

/// Largest batch accepted by ChangeMessageVisibilityBatch
const MAX_BATCH_ENTRIES: usize = 10;

/// Upper bound the service accepts for a visibility timeout (12 hours)
pub const MAX_VISIBILITY_TIMEOUT_SECS: u32 = 43_200;

// ============================================================================
// Configuration
// ============================================================================

/// Connection configuration for the SQS client
#[derive(Debug, Clone, Deserialize)]
pub struct SqsConfig {
    /// AWS region, e.g. "eu-west-1"
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

// ============================================================================
// AWS Signature V4 Signing
// ============================================================================

type HmacSha256 = Hmac<Sha256>;

/// AWS Signature V4 signer for SQS requests.
///
/// Canonical request -> string to sign -> derived signing key -> signature,
/// per the AWS SigV4 process. Only the `host` and `x-amz-date` headers are
/// signed; the query parameters carry the full request.
#[derive(Clone)]
struct SqsSigner {
    access_key: String,
    secret_key: String,
    region: String,
}

impl SqsSigner {
    fn new(access_key: String, secret_key: String, region: String) -> Self {
        Self {
            access_key,
            secret_key,
            region,
        }
    }

    /// Produce the headers for a signed request: `Authorization`,
    /// `x-amz-date`, and `host`.
    fn sign_request(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query_params: &HashMap<String, String>,
        timestamp: &DateTime<Utc>,
    ) -> HashMap<String, String> {
        let date_stamp = timestamp.format("%Y%m%d").to_string();
        let amz_date = timestamp.format("%Y%m%dT%H%M%SZ").to_string();

        // Canonical query string: RFC 3986 encoded, sorted by key
        let mut pairs: Vec<(String, String)> = query_params
            .iter()
            .map(|(k, v)| {
                (
                    urlencoding::encode(k).into_owned(),
                    urlencoding::encode(v).into_owned(),
                )
            })
            .collect();
        pairs.sort();
        let canonical_query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let canonical_headers = format!("host:{}\nx-amz-date:{}\n", host, amz_date);
        let signed_headers = "host;x-amz-date";
        let payload_hash = format!("{:x}", Sha256::digest(b""));

        let canonical_request = format!(
            "{}\n{}\n{}\n{}\n{}\n{}",
            method, path, canonical_query, canonical_headers, signed_headers, payload_hash
        );

        let credential_scope = format!("{}/{}/sqs/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{:x}",
            amz_date,
            credential_scope,
            Sha256::digest(canonical_request.as_bytes())
        );

        let signature = self.calculate_signature(&string_to_sign, &date_stamp);

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.access_key, credential_scope, signed_headers, signature
        );

        let mut headers = HashMap::new();
        headers.insert("Authorization".to_string(), authorization);
        headers.insert("x-amz-date".to_string(), amz_date);
        headers.insert("host".to_string(), host.to_string());
        headers
    }

    /// Derive the signing key through the four-level HMAC chain and sign
    fn calculate_signature(&self, string_to_sign: &str, date_stamp: &str) -> String {
        let k_secret = format!("AWS4{}", self.secret_key);
        let k_date = hmac_sha256(k_secret.as_bytes(), date_stamp.as_bytes());
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"sqs");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes()))
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

// ============================================================================
// SQS Client
// ============================================================================

/// AWS SQS implementation of [`QueueClient`].
///
/// Stateless after construction; safe to share behind an `Arc` across poll
/// cycles.
pub struct SqsClient {
    http_client: HttpClient,
    signer: SqsSigner,
    endpoint: String,
}

impl SqsClient {
    /// Create a new SQS client.
    ///
    /// Fails when the region is empty or credentials are missing; this is a
    /// startup-time error, not a retryable condition.
    pub fn new(config: SqsConfig) -> Result<Self, QueueError> {
        if config.region.is_empty() {
            return Err(QueueError::ConnectionFailed {
                message: "SQS region cannot be empty".to_string(),
            });
        }

        if config.access_key_id.is_empty() || config.secret_access_key.is_empty() {
            return Err(QueueError::AuthenticationFailed {
                message: "SQS credentials are not configured".to_string(),
            });
        }

        let endpoint = format!("https://sqs.{}.amazonaws.com", config.region);
        let signer = SqsSigner::new(
            config.access_key_id,
            config.secret_access_key,
            config.region,
        );

        let http_client = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            http_client,
            signer,
            endpoint,
        })
    }

    /// Issue one signed query-API request and return the raw XML body
    async fn make_request(
        &self,
        params: &HashMap<String, String>,
        queue_url: &QueueUrl,
    ) -> Result<String, QueueError> {
        let host = self
            .endpoint
            .strip_prefix("https://")
            .unwrap_or(&self.endpoint);
        let timestamp = Utc::now();

        let auth_headers = self
            .signer
            .sign_request("POST", host, "/", params, &timestamp);

        let query_string = params
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/?{}", self.endpoint, query_string);

        let mut request = self.http_client.post(&url);
        for (key, value) in auth_headers {
            request = request.header(&key, value);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                QueueError::ConnectionFailed {
                    message: format!("request timeout: {}", e),
                }
            } else if e.is_connect() {
                QueueError::ConnectionFailed {
                    message: format!("connection failed: {}", e),
                }
            } else {
                QueueError::ConnectionFailed {
                    message: format!("HTTP request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to read response body: {}", e),
            })?;

        if !status.is_success() {
            return Err(parse_error_response(&body, status.as_u16(), queue_url));
        }

        Ok(body)
    }
}

impl std::fmt::Debug for SqsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl QueueClient for SqsClient {
    async fn receive_messages(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Vec<ReceivedMessage>, QueueError> {
        let mut params = HashMap::new();
        params.insert("Action".to_string(), "ReceiveMessage".to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert(
            "QueueUrl".to_string(),
            request.queue_url().as_str().to_string(),
        );
        params.insert(
            "MaxNumberOfMessages".to_string(),
            request.max_messages().to_string(),
        );
        params.insert(
            "AttributeName.1".to_string(),
            request.attribute_selector().to_string(),
        );
        params.insert(
            "MessageAttributeName.1".to_string(),
            request.attribute_selector().to_string(),
        );

        let response = self.make_request(&params, request.queue_url()).await?;
        parse_receive_response(&response)
    }

    async fn change_visibility_batch(
        &self,
        queue_url: &QueueUrl,
        entries: Vec<VisibilityExtension>,
    ) -> Result<BatchExtensionOutcome, QueueError> {
        if entries.is_empty() {
            return Ok(BatchExtensionOutcome::default());
        }

        if entries.len() > MAX_BATCH_ENTRIES {
            return Err(QueueError::BatchTooLarge {
                size: entries.len(),
                max_size: MAX_BATCH_ENTRIES,
            });
        }

        let mut params = HashMap::new();
        params.insert(
            "Action".to_string(),
            "ChangeMessageVisibilityBatch".to_string(),
        );
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("QueueUrl".to_string(), queue_url.as_str().to_string());

        // Entry parameters are 1-based; the entry Id carries the 0-based
        // correlation id the caller assigned.
        for (n, entry) in entries.iter().enumerate() {
            let prefix = format!("ChangeMessageVisibilityBatchRequestEntry.{}", n + 1);
            params.insert(format!("{}.Id", prefix), entry.id.to_string());
            params.insert(
                format!("{}.ReceiptHandle", prefix),
                entry.receipt_handle.as_str().to_string(),
            );
            params.insert(
                format!("{}.VisibilityTimeout", prefix),
                entry.timeout_seconds.to_string(),
            );
        }

        let response = self.make_request(&params, queue_url).await?;
        parse_batch_response(&response)
    }

    async fn change_visibility(
        &self,
        queue_url: &QueueUrl,
        receipt_handle: &ReceiptHandle,
        timeout_seconds: u32,
    ) -> Result<(), QueueError> {
        let mut params = HashMap::new();
        params.insert("Action".to_string(), "ChangeMessageVisibility".to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("QueueUrl".to_string(), queue_url.as_str().to_string());
        params.insert(
            "ReceiptHandle".to_string(),
            receipt_handle.as_str().to_string(),
        );
        params.insert(
            "VisibilityTimeout".to_string(),
            timeout_seconds.to_string(),
        );

        // Empty result element on success
        self.make_request(&params, queue_url).await?;
        Ok(())
    }

    async fn send_message(
        &self,
        queue_url: &QueueUrl,
        body: &str,
    ) -> Result<MessageId, QueueError> {
        let mut params = HashMap::new();
        params.insert("Action".to_string(), "SendMessage".to_string());
        params.insert("Version".to_string(), API_VERSION.to_string());
        params.insert("QueueUrl".to_string(), queue_url.as_str().to_string());
        params.insert("MessageBody".to_string(), body.to_string());

        let response = self.make_request(&params, queue_url).await?;
        parse_send_response(&response)
    }
}

// ============================================================================
// Response Parsing
// ============================================================================

/// Parse a ReceiveMessage XML response into received messages
fn parse_receive_response(xml: &str) -> Result<Vec<ReceivedMessage>, QueueError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut messages = Vec::new();
    let mut buf = Vec::new();

    let mut in_message = false;
    let mut in_message_id = false;
    let mut in_receipt_handle = false;
    let mut in_body = false;

    // <Attribute><Name>..</Name><Value>..</Value></Attribute>
    let mut in_system_attr = false;
    // <MessageAttribute><Name>..</Name><Value><StringValue>..</StringValue>..
    let mut in_message_attr = false;
    let mut in_attr_name = false;
    let mut in_attr_value = false;
    let mut in_string_value = false;
    let mut pending_attr_name: Option<String> = None;

    let mut current_message_id: Option<String> = None;
    let mut current_receipt: Option<String> = None;
    let mut current_body: Option<String> = None;
    let mut system_attributes: HashMap<String, String> = HashMap::new();
    let mut attributes: HashMap<String, String> = HashMap::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Message" => {
                    in_message = true;
                    current_message_id = None;
                    current_receipt = None;
                    current_body = None;
                    system_attributes = HashMap::new();
                    attributes = HashMap::new();
                }
                b"MessageId" if in_message => in_message_id = true,
                b"ReceiptHandle" if in_message => in_receipt_handle = true,
                b"Body" if in_message => in_body = true,
                b"Attribute" if in_message => in_system_attr = true,
                b"MessageAttribute" if in_message => in_message_attr = true,
                b"Name" if in_system_attr || in_message_attr => in_attr_name = true,
                b"Value" if in_system_attr => in_attr_value = true,
                b"StringValue" if in_message_attr => in_string_value = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().ok().map(|s| s.into_owned());
                if in_message_id {
                    current_message_id = text;
                    in_message_id = false;
                } else if in_receipt_handle {
                    current_receipt = text;
                    in_receipt_handle = false;
                } else if in_body {
                    current_body = text;
                    in_body = false;
                } else if in_attr_name {
                    pending_attr_name = text;
                    in_attr_name = false;
                } else if in_attr_value {
                    if let (Some(name), Some(value)) = (pending_attr_name.take(), text) {
                        system_attributes.insert(name, value);
                    }
                    in_attr_value = false;
                } else if in_string_value {
                    if let (Some(name), Some(value)) = (pending_attr_name.take(), text) {
                        attributes.insert(name, value);
                    }
                    in_string_value = false;
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"Message" => {
                    in_message = false;

                    if let (Some(receipt), Some(body)) =
                        (current_receipt.take(), current_body.take())
                    {
                        let receipt_handle = ReceiptHandle::new(receipt)?;
                        let message_id = current_message_id
                            .take()
                            .and_then(|id| MessageId::from_str(&id).ok())
                            .unwrap_or_default();
                        let delivery_count = system_attributes
                            .get("ApproximateReceiveCount")
                            .and_then(|c| c.parse().ok())
                            .unwrap_or(1);

                        messages.push(ReceivedMessage {
                            message_id,
                            body: bytes::Bytes::from(body),
                            attributes: std::mem::take(&mut attributes),
                            system_attributes: std::mem::take(&mut system_attributes),
                            receipt_handle,
                            delivery_count,
                        });
                    }
                }
                b"Attribute" => in_system_attr = false,
                b"MessageAttribute" => in_message_attr = false,
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QueueError::SerializationError {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(messages)
}

/// Parse a ChangeMessageVisibilityBatch XML response into the per-entry
/// outcome: succeeded correlation ids and failed entries with reasons
fn parse_batch_response(xml: &str) -> Result<BatchExtensionOutcome, QueueError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut outcome = BatchExtensionOutcome::default();
    let mut buf = Vec::new();

    let mut in_result_entry = false;
    let mut in_error_entry = false;
    let mut in_id = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut in_sender_fault = false;

    let mut current_id: Option<usize> = None;
    let mut current_code: Option<String> = None;
    let mut current_message: Option<String> = None;
    let mut current_sender_fault = false;

    let parse_id = |text: &str| -> Result<usize, QueueError> {
        text.parse().map_err(|_| QueueError::SerializationError {
            message: format!("batch result entry id is not a correlation id: {}", text),
        })
    };

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"ChangeMessageVisibilityBatchResultEntry" => in_result_entry = true,
                b"BatchResultErrorEntry" => {
                    in_error_entry = true;
                    current_id = None;
                    current_code = None;
                    current_message = None;
                    current_sender_fault = false;
                }
                b"Id" if in_result_entry || in_error_entry => in_id = true,
                b"Code" if in_error_entry => in_code = true,
                b"Message" if in_error_entry => in_message = true,
                b"SenderFault" if in_error_entry => in_sender_fault = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| QueueError::SerializationError {
                        message: format!("XML parsing error: {}", e),
                    })?
                    .into_owned();
                if in_id {
                    let id = parse_id(&text)?;
                    if in_result_entry {
                        outcome.succeeded.push(id);
                    } else {
                        current_id = Some(id);
                    }
                    in_id = false;
                } else if in_code {
                    current_code = Some(text);
                    in_code = false;
                } else if in_message {
                    current_message = Some(text);
                    in_message = false;
                } else if in_sender_fault {
                    current_sender_fault = text == "true";
                    in_sender_fault = false;
                }
            }
            Ok(Event::End(ref e)) => match e.name().as_ref() {
                b"ChangeMessageVisibilityBatchResultEntry" => in_result_entry = false,
                b"BatchResultErrorEntry" => {
                    in_error_entry = false;
                    if let Some(id) = current_id.take() {
                        outcome.failed.push(FailedExtension {
                            id,
                            code: current_code.take().unwrap_or_else(|| "Unknown".to_string()),
                            message: current_message.take().unwrap_or_default(),
                            sender_fault: current_sender_fault,
                        });
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QueueError::SerializationError {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(outcome)
}

/// Parse a SendMessage XML response
fn parse_send_response(xml: &str) -> Result<MessageId, QueueError> {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut in_message_id = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"MessageId" => in_message_id = true,
            Ok(Event::Text(e)) if in_message_id => {
                let id = e
                    .unescape()
                    .map_err(|e| QueueError::SerializationError {
                        message: format!("XML parsing error: {}", e),
                    })?
                    .into_owned();
                return MessageId::from_str(&id).map_err(|e| QueueError::SerializationError {
                    message: format!("invalid MessageId in response: {}", e),
                });
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(QueueError::SerializationError {
                    message: format!("XML parsing error: {}", e),
                })
            }
            _ => {}
        }
        buf.clear();
    }

    Err(QueueError::SerializationError {
        message: "MessageId not found in response".to_string(),
    })
}

/// Map an SQS error XML response onto the [`QueueError`] taxonomy
fn parse_error_response(xml: &str, status_code: u16, queue_url: &QueueUrl) -> QueueError {
    use quick_xml::events::Event;
    use quick_xml::Reader;

    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut error_code = None;
    let mut error_message = None;
    let mut in_error = false;
    let mut in_code = false;
    let mut in_message = false;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.name().as_ref() {
                b"Error" => in_error = true,
                b"Code" if in_error => in_code = true,
                b"Message" if in_error => in_message = true,
                _ => {}
            },
            Ok(Event::Text(e)) => {
                if in_code {
                    error_code = e.unescape().ok().map(|s| s.into_owned());
                    in_code = false;
                } else if in_message {
                    error_message = e.unescape().ok().map(|s| s.into_owned());
                    in_message = false;
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"Error" => in_error = false,
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    let code = error_code.unwrap_or_else(|| "Unknown".to_string());
    let message = error_message.unwrap_or_else(|| "Unknown error".to_string());

    match code.as_str() {
        "AWS.SimpleQueueService.NonExistentQueue" | "QueueDoesNotExist" => {
            QueueError::QueueNotFound {
                queue_url: queue_url.as_str().to_string(),
            }
        }
        "InvalidClientTokenId" | "UnrecognizedClientException" | "SignatureDoesNotMatch" => {
            QueueError::AuthenticationFailed {
                message: format!("{}: {}", code, message),
            }
        }
        "InvalidReceiptHandle" | "ReceiptHandleIsInvalid" | "MessageNotInflight" => {
            QueueError::InvalidReceipt { receipt: message }
        }
        _ if status_code == 401 || status_code == 403 => QueueError::AuthenticationFailed {
            message: format!("{}: {}", code, message),
        },
        _ => QueueError::ServiceError { code, message },
    }
}
