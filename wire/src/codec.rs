//! Message encoding and decoding.
//!
//! The envelope follows BSATN conventions: positional `u8` tags for sums,
//! `u32` length prefixes for strings, blobs, and sequences, little-endian
//! integers throughout.

use bytes::Bytes;
use sats::{ByteReader, ByteWriter};

use crate::error::{DecodeError, EncodeError, LimitKind};
use crate::ids::{ConnectionId, EnergyQuanta, Identity, QueryId, RequestId, Timestamp};
use crate::limits::Limits;
use crate::message::{
    ClientMessage, DatabaseUpdate, ReducerCallInfo, ServerMessage, TableUpdate, UpdateStatus,
};

const CLIENT_SUBSCRIBE: u8 = 0;
const CLIENT_UNSUBSCRIBE: u8 = 1;
const CLIENT_CALL_REDUCER: u8 = 2;

const SERVER_IDENTITY_TOKEN: u8 = 0;
const SERVER_SUBSCRIBE_APPLIED: u8 = 1;
const SERVER_SUBSCRIBE_ERROR: u8 = 2;
const SERVER_UNSUBSCRIBE_APPLIED: u8 = 3;
const SERVER_TRANSACTION_UPDATE: u8 = 4;

const STATUS_COMMITTED: u8 = 0;
const STATUS_FAILED: u8 = 1;
const STATUS_OUT_OF_ENERGY: u8 = 2;

const OPTION_SOME: u8 = 0;
const OPTION_NONE: u8 = 1;

/// Encodes a client message to bytes.
pub fn encode_client_message(msg: &ClientMessage) -> Result<Vec<u8>, EncodeError> {
    let mut out = ByteWriter::new();
    match msg {
        ClientMessage::Subscribe { query_id, queries } => {
            out.write_u8(CLIENT_SUBSCRIBE);
            out.write_u32(query_id.raw());
            out.write_len(queries.len())?;
            for query in queries {
                write_string(&mut out, query)?;
            }
        }
        ClientMessage::Unsubscribe { query_id } => {
            out.write_u8(CLIENT_UNSUBSCRIBE);
            out.write_u32(query_id.raw());
        }
        ClientMessage::CallReducer {
            request_id,
            reducer,
            args,
        } => {
            out.write_u8(CLIENT_CALL_REDUCER);
            out.write_u32(request_id.raw());
            write_string(&mut out, reducer)?;
            write_blob(&mut out, args)?;
        }
    }
    Ok(out.into_vec())
}

/// Decodes a client message, enforcing `limits`.
pub fn decode_client_message(bytes: &[u8], limits: &Limits) -> Result<ClientMessage, DecodeError> {
    check_limit(LimitKind::MessageBytes, limits.max_message_bytes, bytes.len())?;
    let mut reader = ByteReader::new(bytes);

    let msg = match reader.read_u8()? {
        CLIENT_SUBSCRIBE => {
            let query_id = QueryId::new(reader.read_u32()?);
            let count = reader.read_len()?;
            check_limit(LimitKind::Queries, limits.max_queries, count)?;
            let mut queries = Vec::with_capacity(count);
            for _ in 0..count {
                queries.push(read_string(&mut reader, limits)?);
            }
            ClientMessage::Subscribe { query_id, queries }
        }
        CLIENT_UNSUBSCRIBE => ClientMessage::Unsubscribe {
            query_id: QueryId::new(reader.read_u32()?),
        },
        CLIENT_CALL_REDUCER => {
            let request_id = RequestId::new(reader.read_u32()?);
            let reducer = read_string(&mut reader, limits)?;
            let args = read_blob(&mut reader, limits.max_row_bytes, LimitKind::RowBytes)?;
            ClientMessage::CallReducer {
                request_id,
                reducer,
                args,
            }
        }
        tag => return Err(DecodeError::UnknownMessageTag { tag }),
    };

    finish(&reader)?;
    Ok(msg)
}

/// Encodes a server message to bytes.
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, EncodeError> {
    let mut out = ByteWriter::new();
    match msg {
        ServerMessage::IdentityToken {
            identity,
            token,
            connection_id,
        } => {
            out.write_u8(SERVER_IDENTITY_TOKEN);
            out.write_bytes(identity.as_bytes());
            write_string(&mut out, token)?;
            out.write_bytes(connection_id.as_bytes());
        }
        ServerMessage::SubscribeApplied { query_id, update } => {
            out.write_u8(SERVER_SUBSCRIBE_APPLIED);
            out.write_u32(query_id.raw());
            encode_database_update(&mut out, update)?;
        }
        ServerMessage::SubscribeError { query_id, message } => {
            out.write_u8(SERVER_SUBSCRIBE_ERROR);
            out.write_u32(query_id.raw());
            write_string(&mut out, message)?;
        }
        ServerMessage::UnsubscribeApplied { query_id, update } => {
            out.write_u8(SERVER_UNSUBSCRIBE_APPLIED);
            out.write_u32(query_id.raw());
            encode_database_update(&mut out, update)?;
        }
        ServerMessage::TransactionUpdate {
            status,
            timestamp,
            caller_identity,
            caller_connection_id,
            reducer,
            energy,
        } => {
            out.write_u8(SERVER_TRANSACTION_UPDATE);
            match status {
                UpdateStatus::Committed(update) => {
                    out.write_u8(STATUS_COMMITTED);
                    encode_database_update(&mut out, update)?;
                }
                UpdateStatus::Failed(message) => {
                    out.write_u8(STATUS_FAILED);
                    write_string(&mut out, message)?;
                }
                UpdateStatus::OutOfEnergy => out.write_u8(STATUS_OUT_OF_ENERGY),
            }
            out.write_u64(timestamp.micros());
            out.write_bytes(caller_identity.as_bytes());
            match caller_connection_id {
                Some(id) => {
                    out.write_u8(OPTION_SOME);
                    out.write_bytes(id.as_bytes());
                }
                None => out.write_u8(OPTION_NONE),
            }
            write_string(&mut out, &reducer.reducer)?;
            write_blob(&mut out, &reducer.args)?;
            out.write_u32(reducer.request_id.raw());
            out.write_u128(energy.raw());
        }
    }
    Ok(out.into_vec())
}

/// Decodes a server message, enforcing `limits`.
pub fn decode_server_message(bytes: &[u8], limits: &Limits) -> Result<ServerMessage, DecodeError> {
    check_limit(LimitKind::MessageBytes, limits.max_message_bytes, bytes.len())?;
    let mut reader = ByteReader::new(bytes);

    let msg = match reader.read_u8()? {
        SERVER_IDENTITY_TOKEN => {
            let identity = read_identity(&mut reader)?;
            let token = read_string(&mut reader, limits)?;
            let connection_id = read_connection_id(&mut reader)?;
            ServerMessage::IdentityToken {
                identity,
                token,
                connection_id,
            }
        }
        SERVER_SUBSCRIBE_APPLIED => ServerMessage::SubscribeApplied {
            query_id: QueryId::new(reader.read_u32()?),
            update: decode_database_update(&mut reader, limits)?,
        },
        SERVER_SUBSCRIBE_ERROR => ServerMessage::SubscribeError {
            query_id: QueryId::new(reader.read_u32()?),
            message: read_string(&mut reader, limits)?,
        },
        SERVER_UNSUBSCRIBE_APPLIED => ServerMessage::UnsubscribeApplied {
            query_id: QueryId::new(reader.read_u32()?),
            update: decode_database_update(&mut reader, limits)?,
        },
        SERVER_TRANSACTION_UPDATE => {
            let status = match reader.read_u8()? {
                STATUS_COMMITTED => {
                    UpdateStatus::Committed(decode_database_update(&mut reader, limits)?)
                }
                STATUS_FAILED => UpdateStatus::Failed(read_string(&mut reader, limits)?),
                STATUS_OUT_OF_ENERGY => UpdateStatus::OutOfEnergy,
                tag => return Err(DecodeError::UnknownStatusTag { tag }),
            };
            let timestamp = Timestamp::from_micros(reader.read_u64()?);
            let caller_identity = read_identity(&mut reader)?;
            let caller_connection_id = match reader.read_u8()? {
                OPTION_SOME => Some(read_connection_id(&mut reader)?),
                OPTION_NONE => None,
                tag => return Err(DecodeError::UnknownOptionTag { tag }),
            };
            let reducer = read_string(&mut reader, limits)?;
            let args = read_blob(&mut reader, limits.max_row_bytes, LimitKind::RowBytes)?;
            let request_id = RequestId::new(reader.read_u32()?);
            let energy = EnergyQuanta::new(reader.read_u128()?);
            ServerMessage::TransactionUpdate {
                status,
                timestamp,
                caller_identity,
                caller_connection_id,
                reducer: ReducerCallInfo {
                    reducer,
                    args,
                    request_id,
                },
                energy,
            }
        }
        tag => return Err(DecodeError::UnknownMessageTag { tag }),
    };

    finish(&reader)?;
    Ok(msg)
}

fn encode_database_update(out: &mut ByteWriter, update: &DatabaseUpdate) -> Result<(), EncodeError> {
    out.write_len(update.tables.len())?;
    for table in &update.tables {
        write_string(out, &table.table_name)?;
        out.write_len(table.deletes.len())?;
        for row in &table.deletes {
            write_blob(out, row)?;
        }
        out.write_len(table.inserts.len())?;
        for row in &table.inserts {
            write_blob(out, row)?;
        }
    }
    Ok(())
}

fn decode_database_update(
    reader: &mut ByteReader<'_>,
    limits: &Limits,
) -> Result<DatabaseUpdate, DecodeError> {
    let table_count = reader.read_len()?;
    check_limit(LimitKind::TablesPerUpdate, limits.max_tables_per_update, table_count)?;

    let mut tables = Vec::with_capacity(table_count);
    for _ in 0..table_count {
        let table_name = read_string(reader, limits)?;
        let deletes = decode_rows(reader, limits)?;
        let inserts = decode_rows(reader, limits)?;
        let total = deletes.len() + inserts.len();
        check_limit(LimitKind::RowsPerTable, limits.max_rows_per_table, total)?;
        tables.push(TableUpdate {
            table_name,
            deletes,
            inserts,
        });
    }
    Ok(DatabaseUpdate { tables })
}

fn decode_rows(reader: &mut ByteReader<'_>, limits: &Limits) -> Result<Vec<Bytes>, DecodeError> {
    let count = reader.read_len()?;
    check_limit(LimitKind::RowsPerTable, limits.max_rows_per_table, count)?;
    let mut rows = Vec::with_capacity(count.min(reader.remaining()));
    for _ in 0..count {
        rows.push(read_blob(reader, limits.max_row_bytes, LimitKind::RowBytes)?);
    }
    Ok(rows)
}

fn write_string(out: &mut ByteWriter, s: &str) -> Result<(), EncodeError> {
    out.write_len(s.len())?;
    out.write_bytes(s.as_bytes());
    Ok(())
}

fn read_string(reader: &mut ByteReader<'_>, limits: &Limits) -> Result<Box<str>, DecodeError> {
    let len = reader.read_len()?;
    check_limit(LimitKind::StringBytes, limits.max_string_bytes, len)?;
    let bytes = reader.read_bytes(len)?;
    let s = std::str::from_utf8(bytes).map_err(|_| sats::DecodeError::InvalidUtf8)?;
    Ok(s.into())
}

fn write_blob(out: &mut ByteWriter, blob: &[u8]) -> Result<(), EncodeError> {
    out.write_len(blob.len())?;
    out.write_bytes(blob);
    Ok(())
}

fn read_blob(
    reader: &mut ByteReader<'_>,
    limit: usize,
    kind: LimitKind,
) -> Result<Bytes, DecodeError> {
    let len = reader.read_len()?;
    check_limit(kind, limit, len)?;
    Ok(Bytes::copy_from_slice(reader.read_bytes(len)?))
}

fn read_identity(reader: &mut ByteReader<'_>) -> Result<Identity, DecodeError> {
    Ok(Identity::new(reader.read_array()?))
}

fn read_connection_id(reader: &mut ByteReader<'_>) -> Result<ConnectionId, DecodeError> {
    Ok(ConnectionId::new(reader.read_array()?))
}

fn check_limit(kind: LimitKind, limit: usize, actual: usize) -> Result<(), DecodeError> {
    if actual > limit {
        return Err(DecodeError::LimitsExceeded {
            kind,
            limit,
            actual,
        });
    }
    Ok(())
}

fn finish(reader: &ByteReader<'_>) -> Result<(), DecodeError> {
    if reader.is_empty() {
        Ok(())
    } else {
        Err(DecodeError::TrailingBytes {
            remaining: reader.remaining(),
        })
    }
}
