//! # Message Transport Service
//!
//! Orchestrates chunking, header coding and store calls.
//!
//! ## Dependencies
//!
//! - `BlockStore` - content-addressed block storage (required)
//! - `MessageMetadataStore` - record persistence (optional)
//! - `ChecksumProvider` - block addressing, SHA-256 by default
//! - `TimeSource` - header and record timestamps

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use mt_01_block_chunking::{
    decode_header_block, encode_header, encode_header_index, join_blocks, split_into_blocks, Block,
    BlockStore, BlockStoreError, CblHeader, ChecksumProvider, CodecError, HeaderBlock, HeaderIndex,
    Sha256ChecksumProvider, MAX_HEADER_DEPTH,
};
use shared_types::{
    BlockId, MessageFilter, MessageId, MessageMetadataStore, MessageRecord, NodeId,
    SystemTimeSource, TimeSource,
};

use crate::config::TransportConfig;
use crate::domain::{
    retry_with_backoff, validate_content_size, validate_options, CreatedMessage, MessageOptions,
    RetryPolicy, TransportCause, TransportError,
};
use crate::ports::inbound::MessageTransportApi;

/// Message transport over a `BlockStore`.
///
/// Collaborators are injected; nothing is looked up globally.
pub struct MessageTransportService {
    config: TransportConfig,
    /// Recorded as the header creator.
    local_node: NodeId,
    store: Arc<dyn BlockStore>,
    metadata: Option<Arc<dyn MessageMetadataStore>>,
    checksum: Arc<dyn ChecksumProvider>,
    clock: Arc<dyn TimeSource>,
    retry: RetryPolicy,
}

impl MessageTransportService {
    /// Fails when the config is invalid or its block size differs from the store's.
    pub fn new(
        config: TransportConfig,
        local_node: NodeId,
        store: Arc<dyn BlockStore>,
    ) -> Result<Self, TransportError> {
        config.validate()?;
        if store.block_size() != config.block_size {
            return Err(TransportError::validation(
                "block_size",
                format!(
                    "configured {} bytes but the block store uses {} bytes",
                    config.block_size.bytes(),
                    store.block_size().bytes()
                ),
            ));
        }
        Ok(Self {
            retry: config.retry_policy(),
            config,
            local_node,
            store,
            metadata: None,
            checksum: Arc::new(Sha256ChecksumProvider),
            clock: Arc::new(SystemTimeSource),
        })
    }

    pub fn with_metadata_store(mut self, metadata: Arc<dyn MessageMetadataStore>) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_checksum_provider(mut self, checksum: Arc<dyn ChecksumProvider>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_time_source(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn retrieval_url(&self, message_id: &MessageId) -> String {
        format!("{}{}", self.config.retrieval_url_prefix, message_id.to_hex())
    }

    /// Parse a retrieval URL (or a bare hex id) back into a `MessageId`.
    pub fn parse_message_id(&self, locator: &str) -> Result<MessageId, TransportError> {
        let hex = locator
            .strip_prefix(self.config.retrieval_url_prefix.as_str())
            .unwrap_or(locator);
        MessageId::from_str(hex).map_err(|e| TransportError::not_found(locator, e))
    }

    /// Store one block with retry.
    ///
    /// Returns `true` when this call wrote the block, `false` when the address
    /// was already present.
    async fn store_block(&self, id: BlockId, data: &[u8]) -> Result<bool, BlockStoreError> {
        let store = self.store.as_ref();
        retry_with_backoff(&self.retry, "put_block", || {
            let block = Block::new(id, data.to_vec());
            async move {
                if store.has(&block.id).await? {
                    return Ok(false);
                }
                match store.put(block).await {
                    Ok(()) => Ok(true),
                    Err(BlockStoreError::AlreadyExists { .. }) => Ok(false),
                    Err(e) => Err(e),
                }
            }
        })
        .await
    }

    /// Best-effort delete of blocks written by a failed create.
    async fn cleanup(&self, written: &[BlockId]) {
        if written.is_empty() {
            return;
        }
        info!(blocks = written.len(), "Cleaning up blocks after failed message creation");
        for id in written.iter().rev() {
            if let Err(e) = self.store.delete(id).await {
                warn!(block_id = %id, error = %e, "Cleanup delete failed");
            }
        }
    }

    /// Split an oversized encoded header behind index blocks.
    ///
    /// Returns the segment blocks and the root block bytes.
    fn index_header(
        &self,
        header: &CblHeader,
        header_bytes: Vec<u8>,
    ) -> Result<(Vec<Vec<u8>>, Vec<u8>), TransportError> {
        let block_len = self.config.block_size.bytes();
        let mut segments = Vec::new();
        let mut level = header_bytes;
        for _ in 0..MAX_HEADER_DEPTH {
            if level.len() <= block_len {
                return Ok((segments, level));
            }
            let parts = split_into_blocks(&level, block_len);
            let index = HeaderIndex {
                creator: header.creator,
                timestamp: header.timestamp,
                header_length: level.len() as u64,
                block_size: header.block_size,
                message: header.is_message(),
                encrypted: header.encrypted,
                segment_ids: parts
                    .iter()
                    .map(|p| BlockId::new(self.checksum.checksum(p)))
                    .collect(),
            };
            debug!(
                header_len = level.len(),
                segments = parts.len(),
                "Header exceeds one block, indexing"
            );
            segments.extend(parts);
            level = encode_header_index(&index)
                .map_err(|e| TransportError::storage("encode_header", e))?;
        }
        if level.len() <= block_len {
            return Ok((segments, level));
        }
        Err(TransportError::validation(
            "header",
            format!("header still needs {} bytes after {MAX_HEADER_DEPTH} index levels", level.len()),
        ))
    }

    async fn write_message(
        &self,
        blocks: Vec<Vec<u8>>,
        block_ids: &[BlockId],
        header_segments: Vec<Vec<u8>>,
        header_root: Vec<u8>,
        written: &mut Vec<BlockId>,
    ) -> Result<MessageId, TransportError> {
        for (id, data) in block_ids.iter().zip(&blocks) {
            if self
                .store_block(*id, data)
                .await
                .map_err(|e| TransportError::storage("put_block", e))?
            {
                written.push(*id);
            } else {
                debug!(block_id = %id, "Block already stored, reusing");
            }
        }

        for segment in &header_segments {
            let id = BlockId::new(self.checksum.checksum(segment));
            if self
                .store_block(id, segment)
                .await
                .map_err(|e| TransportError::storage("put_header", e))?
            {
                written.push(id);
            }
        }

        let mut header_block = header_root;
        header_block.resize(self.config.block_size.bytes(), 0);
        let header_id = BlockId::new(self.checksum.checksum(&header_block));
        if self
            .store_block(header_id, &header_block)
            .await
            .map_err(|e| TransportError::storage("put_header", e))?
        {
            written.push(header_id);
        }
        Ok(MessageId::new(header_id))
    }

    async fn store_record(&self, record: MessageRecord) -> Result<(), TransportError> {
        let Some(metadata) = &self.metadata else {
            return Ok(());
        };
        let metadata = metadata.as_ref();
        retry_with_backoff(&self.retry, "store_message_metadata", || {
            let record = record.clone();
            async move { metadata.store_message_metadata(record).await }
        })
        .await
        .map_err(|e| TransportError::storage("store_message_metadata", e))
    }

    /// Fetch, verify and join `ids` into `length` bytes.
    async fn read_blocks(&self, ids: &[BlockId], length: u64) -> Result<Vec<u8>, TransportCause> {
        let mut blocks = Vec::with_capacity(ids.len());
        for id in ids {
            blocks.push(self.fetch_verified(id).await?.data);
        }

        let available: u64 = blocks.iter().map(|b| b.len() as u64).sum();
        if available < length {
            return Err(TransportCause::Truncated {
                expected: length,
                actual: available,
            });
        }
        let length = usize::try_from(length).map_err(|_| CodecError::HeaderMalformed {
            offset: 48,
            reason: "original length exceeds addressable memory".to_string(),
        })?;
        Ok(join_blocks(&blocks, length))
    }

    /// Decode the header under `message_id`, following index blocks.
    async fn read_header(&self, message_id: &MessageId) -> Result<CblHeader, TransportCause> {
        let mut bytes = self.fetch_verified(&message_id.block_id()).await?.data;
        for _ in 0..=MAX_HEADER_DEPTH {
            match decode_header_block(&bytes)? {
                HeaderBlock::Header(header) => return Ok(header),
                HeaderBlock::Index(index) => {
                    bytes = self
                        .read_blocks(&index.segment_ids, index.header_length)
                        .await?;
                }
            }
        }
        Err(CodecError::HeaderMalformed {
            offset: 0,
            reason: format!("header index nested deeper than {MAX_HEADER_DEPTH} levels"),
        }
        .into())
    }

    async fn read_content(&self, message_id: &MessageId) -> Result<Vec<u8>, TransportCause> {
        let header = self.read_header(message_id).await?;
        self.read_blocks(&header.block_ids, header.original_length)
            .await
    }

    async fn fetch_verified(&self, id: &BlockId) -> Result<Block, TransportCause> {
        let block = self.store.get(id).await?;
        if !self.checksum.verify(&block.data, id.as_bytes()) {
            return Err(TransportCause::ChecksumMismatch { id: *id });
        }
        Ok(block)
    }
}

#[async_trait]
impl MessageTransportApi for MessageTransportService {
    async fn create_message(
        &self,
        content: &[u8],
        options: &MessageOptions,
    ) -> Result<CreatedMessage, TransportError> {
        validate_options(options, self.config.max_recipients_per_message)?;
        validate_content_size(content.len(), self.config.max_message_size_threshold)?;

        let block_size = self.config.block_size;
        let blocks = split_into_blocks(content, block_size.bytes());
        let block_ids: Vec<BlockId> = blocks
            .iter()
            .map(|b| BlockId::new(self.checksum.checksum(b)))
            .collect();
        let now = self.clock.now_ms();

        let header = CblHeader {
            creator: self.local_node,
            timestamp: now,
            original_length: content.len() as u64,
            block_size,
            encrypted: options.encryption_scheme.is_encrypted(),
            block_ids: block_ids.clone(),
            message: Some(options.header_fields()),
        };
        let header_bytes = encode_header(&header).map_err(|e| match e {
            CodecError::FieldTooLong { field, len, max } => TransportError::validation(
                field,
                format!("{len} bytes exceeds the maximum of {max}"),
            ),
            other => TransportError::storage("encode_header", other),
        })?;
        let (header_segments, header_root) = self.index_header(&header, header_bytes)?;

        let mut written = Vec::new();
        let message_id = match self
            .write_message(blocks, &block_ids, header_segments, header_root, &mut written)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                self.cleanup(&written).await;
                return Err(e);
            }
        };

        let is_cbl = block_ids.len() > 1;
        let record = MessageRecord {
            id: message_id,
            message_type: options.message_type.clone(),
            sender_id: options.sender_id.clone(),
            recipients: options.recipients.clone(),
            priority: options.priority,
            encryption_scheme: options.encryption_scheme,
            delivery_status: MessageRecord::pending_statuses(&options.recipients),
            acknowledgments: BTreeMap::new(),
            is_cbl,
            content_block_ids: if is_cbl { block_ids.clone() } else { Vec::new() },
            created_at: now,
            size: content.len() as u64,
            block_size,
        };
        if let Err(e) = self.store_record(record).await {
            self.cleanup(&written).await;
            return Err(e);
        }

        info!(
            message_id = %message_id,
            blocks = block_ids.len(),
            size = content.len(),
            recipients = options.recipients.len(),
            "Message created"
        );
        Ok(CreatedMessage {
            retrieval_url: self.retrieval_url(&message_id),
            message_id,
            content_block_ids: block_ids,
        })
    }

    async fn get_message_content(&self, message_id: &MessageId) -> Result<Vec<u8>, TransportError> {
        self.read_content(message_id).await.map_err(|cause| {
            debug!(message_id = %message_id, error = %cause, "Message retrieval failed");
            TransportError::not_found(message_id.to_hex(), cause)
        })
    }

    async fn get_message_metadata(
        &self,
        message_id: &MessageId,
    ) -> Result<Option<MessageRecord>, TransportError> {
        match &self.metadata {
            Some(metadata) => metadata
                .get(message_id)
                .await
                .map_err(|e| TransportError::not_found(message_id.to_hex(), e)),
            None => Ok(None),
        }
    }

    async fn query_messages(
        &self,
        filter: &MessageFilter,
    ) -> Result<Vec<MessageRecord>, TransportError> {
        match &self.metadata {
            Some(metadata) => metadata
                .query_messages(filter)
                .await
                .map_err(|e| TransportError::storage("query_messages", e)),
            None => Ok(Vec::new()),
        }
    }
}
