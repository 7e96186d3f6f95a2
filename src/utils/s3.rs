//! S3-compatible remote bucket
//!
//! Path-style requests signed with AWS Signature Version 4. Only the calls
//! the backup run needs are implemented: put object, list objects (v2) and
//! delete object.

use super::storage::{StorageBackend, StoredObject};
use crate::config::S3Settings;
use crate::managers::archive::BackupArtifact;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::blocking::{Body, Client, RequestBuilder};
use reqwest::Method;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use tracing::{debug, info};

const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

/// Minimal S3 client bound to one bucket
pub struct S3Client {
    settings: S3Settings,
    http: Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
    last_modified: String,
}

impl S3Client {
    pub fn new(settings: S3Settings) -> Result<Self> {
        // Uploads of large archives must not be cut off by a request timeout
        let http = Client::builder()
            .timeout(None)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { settings, http })
    }

    pub fn bucket(&self) -> &str {
        &self.settings.bucket
    }

    /// Upload a local file as an object
    pub fn put_object(&self, key: &str, path: &std::path::Path, content_type: &str) -> Result<()> {
        let payload_hash = hash_file(path)?;
        let file = File::open(path).context(format!("Failed to open {:?}", path))?;

        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());

        let request = self.signed_request(
            Method::PUT,
            &object_path(&self.settings.bucket, key),
            &BTreeMap::new(),
            headers,
            &payload_hash,
        )?;
        let response = request
            .body(Body::from(file))
            .send()
            .context(format!("Failed to upload {}", key))?;
        check_status(response, "put object")?;

        info!("Uploaded {} to bucket {}", key, self.settings.bucket);
        Ok(())
    }

    /// List all objects whose key starts with `prefix`, following pagination
    pub fn list_objects(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut query = BTreeMap::new();
            query.insert("list-type".to_string(), "2".to_string());
            query.insert("prefix".to_string(), prefix.to_string());
            if let Some(ref token) = continuation {
                query.insert("continuation-token".to_string(), token.clone());
            }

            let request = self.signed_request(
                Method::GET,
                &format!("/{}", uri_encode(&self.settings.bucket, false)),
                &query,
                BTreeMap::new(),
                EMPTY_PAYLOAD_SHA256,
            )?;
            let response = request.send().context("Failed to list objects")?;
            let body = check_status(response, "list objects")?
                .text()
                .context("Failed to read list objects response")?;

            let page = parse_list_response(&body)?;
            for listed in page.contents {
                let last_modified = DateTime::parse_from_rfc3339(&listed.last_modified)
                    .context(format!(
                        "Invalid LastModified '{}' for {}",
                        listed.last_modified, listed.key
                    ))?
                    .with_timezone(&Utc);
                objects.push(StoredObject {
                    key: listed.key,
                    last_modified,
                });
            }

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(token)) => continuation = Some(token),
                _ => break,
            }
        }

        debug!(
            "Listed {} object(s) with prefix '{}' in bucket {}",
            objects.len(),
            prefix,
            self.settings.bucket
        );
        Ok(objects)
    }

    /// Delete a single object
    pub fn delete_object(&self, key: &str) -> Result<()> {
        let request = self.signed_request(
            Method::DELETE,
            &object_path(&self.settings.bucket, key),
            &BTreeMap::new(),
            BTreeMap::new(),
            EMPTY_PAYLOAD_SHA256,
        )?;
        let response = request.send().context(format!("Failed to delete {}", key))?;
        check_status(response, "delete object")?;
        Ok(())
    }

    fn signed_request(
        &self,
        method: Method,
        canonical_path: &str,
        query: &BTreeMap<String, String>,
        mut headers: BTreeMap<String, String>,
        payload_hash: &str,
    ) -> Result<RequestBuilder> {
        let now = Utc::now();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        headers.insert("host".to_string(), self.settings.endpoint.clone());
        headers.insert("x-amz-content-sha256".to_string(), payload_hash.to_string());
        headers.insert("x-amz-date".to_string(), amz_date);

        let query_string = canonical_query(query);
        let authorization = sign_v4(
            method.as_str(),
            canonical_path,
            &query_string,
            &headers,
            payload_hash,
            &self.settings,
            now,
        )?;

        let mut url = format!(
            "{}://{}{}",
            self.settings.endpoint_proto, self.settings.endpoint, canonical_path
        );
        if !query_string.is_empty() {
            url.push('?');
            url.push_str(&query_string);
        }

        let mut request = self.http.request(method, &url);
        for (name, value) in &headers {
            request = request.header(name.as_str(), value.as_str());
        }
        Ok(request.header("authorization", authorization))
    }
}

/// The remote bucket as a storage target
pub struct S3Storage {
    client: S3Client,
    name: String,
}

impl S3Storage {
    pub fn new(settings: S3Settings) -> Result<Self> {
        let name = format!("bucket {}", settings.bucket);
        Ok(Self {
            client: S3Client::new(settings)?,
            name,
        })
    }
}

impl StorageBackend for S3Storage {
    fn name(&self) -> &str {
        &self.name
    }

    fn copy(&self, artifact: &BackupArtifact) -> Result<()> {
        self.client
            .put_object(&artifact.name, &artifact.path, artifact.content_type())
    }

    fn list(&self, prefix: &str) -> Result<Vec<StoredObject>> {
        self.client.list_objects(prefix)
    }

    fn remove(&self, objects: &[StoredObject]) -> Vec<anyhow::Error> {
        objects
            .iter()
            .filter_map(|object| self.client.delete_object(&object.key).err())
            .collect()
    }
}

fn parse_list_response(body: &str) -> Result<ListBucketResult> {
    quick_xml::de::from_str(body).context("Failed to parse list objects response")
}

fn check_status(
    response: reqwest::blocking::Response,
    operation: &str,
) -> Result<reqwest::blocking::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    anyhow::bail!("S3 {} failed with status {}: {}", operation, status, body.trim())
}

fn object_path(bucket: &str, key: &str) -> String {
    format!("/{}/{}", uri_encode(bucket, false), uri_encode(key, true))
}

fn hash_file(path: &std::path::Path) -> Result<String> {
    let mut file = File::open(path).context(format!("Failed to open {:?}", path))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).context(format!("Failed to read {:?}", path))?;
    Ok(hex::encode(hasher.finalize()))
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Percent-encode per the SigV4 rules; `/` is kept in object keys
fn uri_encode(input: &str, keep_slash: bool) -> String {
    let mut encoded = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                encoded.push(byte as char)
            }
            b'/' if keep_slash => encoded.push('/'),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }
    encoded
}

fn canonical_query(query: &BTreeMap<String, String>) -> String {
    query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k, false), uri_encode(v, false)))
        .collect::<Vec<_>>()
        .join("&")
}

fn sign_v4(
    method: &str,
    canonical_path: &str,
    canonical_query: &str,
    headers: &BTreeMap<String, String>,
    payload_hash: &str,
    settings: &S3Settings,
    now: DateTime<Utc>,
) -> Result<String> {
    let date_stamp = now.format("%Y%m%d").to_string();
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let scope = format!("{}/{}/s3/aws4_request", date_stamp, settings.region);

    let canonical_headers: String = headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v.trim()))
        .collect();
    let signed_headers = headers.keys().cloned().collect::<Vec<_>>().join(";");

    let canonical_request = format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        method, canonical_path, canonical_query, canonical_headers, signed_headers, payload_hash
    );
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        hex_sha256(canonical_request.as_bytes())
    );

    let k_date = hmac_sha256(
        format!("AWS4{}", settings.secret_access_key).as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, settings.region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, b"s3")?;
    let k_signing = hmac_sha256(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac_sha256(&k_signing, string_to_sign.as_bytes())?);

    Ok(format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        settings.access_key_id, scope, signed_headers, signature
    ))
}
