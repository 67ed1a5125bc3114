use ethers::abi::{self, Token};
use ethers::types::{Address, U256};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::registry::{render_path, PathStep, RouteRegistry, Shape, SwapRouteDescriptor};
use crate::registry::{BUILTIN_ENTRY, BUILTIN_WRAPPED};
use crate::{format_selector, DecodeError, Result};

/// Intended swap parameters recovered from call data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedSwap {
    pub route: &'static str,
    pub wrapped_route: Option<&'static str>,
    /// Raw input amount, not scaled by decimals
    pub amount: U256,
    pub from_token: Address,
    pub to_token: Address,
}

/// Entry and wrapped route tables.
#[derive(Debug, Clone)]
pub struct SwapDecoder {
    entry: RouteRegistry,
    wrapped: RouteRegistry,
}

static BUILTIN_DECODER: Lazy<SwapDecoder> =
    Lazy::new(|| SwapDecoder::new(BUILTIN_ENTRY.clone(), BUILTIN_WRAPPED.clone()));

/// Decode hex call data with the built-in route tables.
pub fn decode_swap(tx_hash: &str, input: &str) -> Result<DecodedSwap> {
    SwapDecoder::builtin().decode_hex(tx_hash, input)
}

impl SwapDecoder {
    pub fn new(entry: RouteRegistry, wrapped: RouteRegistry) -> Self {
        Self { entry, wrapped }
    }

    pub fn builtin() -> &'static SwapDecoder {
        &BUILTIN_DECODER
    }

    /// Decode a `0x`-prefixed hex `input` as found in explorer rows.
    pub fn decode_hex(&self, tx_hash: &str, input: &str) -> Result<DecodedSwap> {
        let trimmed = input.trim();
        let hex_part = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(hex_part).map_err(|e| DecodeError::InvalidHex {
            tx_hash: tx_hash.to_string(),
            message: e.to_string(),
        })?;
        self.decode(tx_hash, &bytes)
    }

    pub fn decode(&self, tx_hash: &str, input: &[u8]) -> Result<DecodedSwap> {
        let (route, args) = decode_call(&self.entry, tx_hash, input)?;
        let root = Token::Tuple(args);
        let root_shape = route.root_shape();

        let amount = match &route.amount_path {
            Some(path) => resolve_uint(route, &root, &root_shape, path)?,
            None => {
                return Err(DecodeError::MissingPath {
                    route: route.name.to_string(),
                    field: "amount",
                })
            }
        };

        // Tokens come from the wrapped call when there is one.
        let (token_route, token_root, token_shape, wrapped_route) = match &route.inner_call_path {
            Some(path) => {
                let blob = resolve_bytes(route, &root, &root_shape, path)?;
                let (inner, inner_args) = decode_call(&self.wrapped, tx_hash, &blob)?;
                let inner_shape = inner.root_shape();
                (inner, Token::Tuple(inner_args), inner_shape, Some(inner.name))
            }
            None => (route, root, root_shape, None),
        };

        let from_token = match &token_route.from_token_path {
            Some(path) => resolve_token_address(token_route, &token_root, &token_shape, path)?,
            None => {
                return Err(DecodeError::MissingPath {
                    route: token_route.name.to_string(),
                    field: "from_token",
                })
            }
        };
        let to_token = match &token_route.to_token_path {
            Some(path) => resolve_token_address(token_route, &token_root, &token_shape, path)?,
            None => {
                return Err(DecodeError::MissingPath {
                    route: token_route.name.to_string(),
                    field: "to_token",
                })
            }
        };

        debug!(
            "🔍 Decoded {} via {}{}: {:#x} -> {:#x}, amount {}",
            tx_hash,
            route.name,
            wrapped_route.map(|w| format!("/{}", w)).unwrap_or_default(),
            from_token,
            to_token,
            amount
        );

        Ok(DecodedSwap {
            route: route.name,
            wrapped_route,
            amount,
            from_token,
            to_token,
        })
    }
}

fn decode_call<'r>(
    registry: &'r RouteRegistry,
    tx_hash: &str,
    input: &[u8],
) -> Result<(&'r SwapRouteDescriptor, Vec<Token>)> {
    if input.len() < 4 {
        return Err(DecodeError::Truncated {
            tx_hash: tx_hash.to_string(),
            len: input.len(),
        });
    }
    let mut selector = [0u8; 4];
    selector.copy_from_slice(&input[..4]);

    let route = registry
        .get(&selector)
        .ok_or_else(|| DecodeError::UnsupportedRoute {
            selector: format_selector(&selector),
            tx_hash: tx_hash.to_string(),
        })?;

    let args = abi::decode(&route.param_types(), &input[4..]).map_err(|e| DecodeError::Abi {
        route: route.name.to_string(),
        tx_hash: tx_hash.to_string(),
        message: e.to_string(),
    })?;
    Ok((route, args))
}

fn path_error(route: &SwapRouteDescriptor, path: &[PathStep], message: impl Into<String>) -> DecodeError {
    DecodeError::Path {
        route: route.name.to_string(),
        path: render_path(path),
        message: message.into(),
    }
}

/// Walk `path` through the decoded tokens, keeping the matching shape in step.
fn walk<'a>(
    route: &SwapRouteDescriptor,
    root: &'a Token,
    root_shape: &Shape,
    path: &[PathStep],
) -> Result<(&'a Token, Shape)> {
    let mut token = root;
    let mut shape = root_shape.clone();

    for step in path {
        let (next_token, next_shape) = match (token, &shape, step) {
            (Token::Tuple(items), Shape::Tuple(fields), PathStep::Index(i)) => {
                let field = fields
                    .get(*i)
                    .ok_or_else(|| path_error(route, path, format!("no member {}", i)))?;
                (items.get(*i), field.kind.clone())
            }
            (Token::Tuple(items), Shape::Tuple(fields), PathStep::Field(name)) => {
                let position = fields
                    .iter()
                    .position(|f| f.name == *name)
                    .ok_or_else(|| path_error(route, path, format!("no member named {}", name)))?;
                (items.get(position), fields[position].kind.clone())
            }
            (Token::Array(items), Shape::Array(inner), PathStep::Index(i)) => {
                (items.get(*i), (**inner).clone())
            }
            _ => return Err(path_error(route, path, format!("cannot apply {}", step))),
        };
        token = next_token.ok_or_else(|| path_error(route, path, "value missing"))?;
        shape = next_shape;
    }
    Ok((token, shape))
}

fn resolve_uint(
    route: &SwapRouteDescriptor,
    root: &Token,
    root_shape: &Shape,
    path: &[PathStep],
) -> Result<U256> {
    match walk(route, root, root_shape, path)? {
        (Token::Uint(value), _) => Ok(*value),
        (other, _) => Err(path_error(route, path, format!("expected uint256, found {:?}", other))),
    }
}

fn resolve_bytes(
    route: &SwapRouteDescriptor,
    root: &Token,
    root_shape: &Shape,
    path: &[PathStep],
) -> Result<Vec<u8>> {
    match walk(route, root, root_shape, path)? {
        (Token::Bytes(blob), _) => Ok(blob.clone()),
        (other, _) => Err(path_error(route, path, format!("expected bytes, found {:?}", other))),
    }
}

/// Token paths may land on an address or a packed uint256 whose low 20 bytes
/// hold the address.
fn resolve_token_address(
    route: &SwapRouteDescriptor,
    root: &Token,
    root_shape: &Shape,
    path: &[PathStep],
) -> Result<Address> {
    match walk(route, root, root_shape, path)? {
        (Token::Address(address), _) => Ok(*address),
        (Token::Uint(packed), _) => Ok(low_address(*packed)),
        (other, _) => Err(path_error(route, path, format!("expected address, found {:?}", other))),
    }
}

pub(crate) fn low_address(packed: U256) -> Address {
    let mut word = [0u8; 32];
    packed.to_big_endian(&mut word);
    Address::from_slice(&word[12..])
}
