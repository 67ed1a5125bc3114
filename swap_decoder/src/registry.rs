use std::collections::HashMap;

use ethers::abi::ParamType;
use once_cell::sync::Lazy;

use self::PathStep::{Field as F, Index as I};
use crate::{format_selector, DecodeError, Result};

/// Aggregator router whose entry methods are listed in [`builtin_entry_routes`].
pub const ROUTER_ADDRESS: &str = "0xb300000b72deaeb607a12d5f54773d1c19c7028d";

/// ABI type with field names kept, so token paths can address tuple members
/// by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Address,
    Uint,
    Bool,
    Bytes,
    Array(Box<Shape>),
    Tuple(Vec<Field>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub kind: Shape,
}

impl Shape {
    pub fn array(inner: Shape) -> Self {
        Shape::Array(Box::new(inner))
    }

    pub fn param_type(&self) -> ParamType {
        match self {
            Shape::Address => ParamType::Address,
            Shape::Uint => ParamType::Uint(256),
            Shape::Bool => ParamType::Bool,
            Shape::Bytes => ParamType::Bytes,
            Shape::Array(inner) => ParamType::Array(Box::new(inner.param_type())),
            Shape::Tuple(fields) => {
                ParamType::Tuple(fields.iter().map(|f| f.kind.param_type()).collect())
            }
        }
    }
}

pub fn field(name: &'static str, kind: Shape) -> Field {
    Field { name, kind }
}

/// One step into a decoded argument list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStep {
    Index(usize),
    Field(&'static str),
}

impl std::fmt::Display for PathStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathStep::Index(i) => write!(f, "[{}]", i),
            PathStep::Field(name) => write!(f, ".{}", name),
        }
    }
}

pub fn render_path(path: &[PathStep]) -> String {
    path.iter().map(|step| step.to_string()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRouteDescriptor {
    pub selector: [u8; 4],
    pub name: &'static str,
    pub arguments: Vec<Field>,
    pub amount_path: Option<Vec<PathStep>>,
    pub from_token_path: Option<Vec<PathStep>>,
    pub to_token_path: Option<Vec<PathStep>>,
    pub inner_call_path: Option<Vec<PathStep>>,
}

impl SwapRouteDescriptor {
    pub fn new(selector: [u8; 4], name: &'static str, arguments: Vec<Field>) -> Self {
        Self {
            selector,
            name,
            arguments,
            amount_path: None,
            from_token_path: None,
            to_token_path: None,
            inner_call_path: None,
        }
    }

    pub fn with_amount(mut self, path: Vec<PathStep>) -> Self {
        self.amount_path = Some(path);
        self
    }

    pub fn with_tokens(mut self, from: Vec<PathStep>, to: Vec<PathStep>) -> Self {
        self.from_token_path = Some(from);
        self.to_token_path = Some(to);
        self
    }

    pub fn with_inner_call(mut self, path: Vec<PathStep>) -> Self {
        self.inner_call_path = Some(path);
        self
    }

    /// Parameter types for `ethers::abi::decode`.
    pub fn param_types(&self) -> Vec<ParamType> {
        self.arguments.iter().map(|f| f.kind.param_type()).collect()
    }

    /// The argument list viewed as one tuple, the root of every path.
    pub fn root_shape(&self) -> Shape {
        Shape::Tuple(self.arguments.clone())
    }
}

/// Descriptors keyed by selector. Selectors are unique.
#[derive(Debug, Clone, Default)]
pub struct RouteRegistry {
    routes: HashMap<[u8; 4], SwapRouteDescriptor>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_routes(routes: Vec<SwapRouteDescriptor>) -> Result<Self> {
        let mut registry = Self::new();
        for route in routes {
            registry.register(route)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, route: SwapRouteDescriptor) -> Result<()> {
        if self.routes.contains_key(&route.selector) {
            return Err(DecodeError::DuplicateSelector(format_selector(&route.selector)));
        }
        self.routes.insert(route.selector, route);
        Ok(())
    }

    pub fn get(&self, selector: &[u8; 4]) -> Option<&SwapRouteDescriptor> {
        self.routes.get(selector)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn with_fee_args(call_name: &'static str) -> Vec<Field> {
    vec![
        field("fromTokenWithFee", Shape::Uint),
        field("fromAmt", Shape::Uint),
        field("toTokenWithFee", Shape::Uint),
        field(call_name, Shape::Bytes),
    ]
}

/// Methods of the aggregator router.
pub fn builtin_entry_routes() -> Vec<SwapRouteDescriptor> {
    let mut routes = vec![
        SwapRouteDescriptor::new(
            [0xda, 0xd1, 0x2b, 0x6c],
            "proxySwap",
            vec![
                field("router", Shape::Address),
                field("fromTokenWithFee", Shape::Uint),
                field("fromAmt", Shape::Uint),
                field("toTokenWithFee", Shape::Uint),
                field("callData", Shape::Bytes),
            ],
        )
        .with_amount(vec![I(2)])
        .with_inner_call(vec![I(4)]),
        SwapRouteDescriptor::new(
            [0xe5, 0xe8, 0x89, 0x4b],
            "proxySwapV2",
            vec![
                field("router", Shape::Address),
                field("fromTokenWithFee", Shape::Uint),
                field("fromAmt", Shape::Uint),
                field("toTokenWithFee", Shape::Uint),
                field("minReturnAmt", Shape::Uint),
                field("callData", Shape::Bytes),
            ],
        )
        .with_amount(vec![I(2)])
        .with_inner_call(vec![I(5)]),
    ];

    let bridged: [([u8; 4], &'static str); 4] = [
        ([0xa0, 0x3d, 0xe6, 0xa9], "callOneInch"),
        ([0xda, 0xdb, 0x69, 0x3f], "callRango"),
        ([0x84, 0x9c, 0xe5, 0x72], "callLiFi"),
        ([0x31, 0x66, 0xc3, 0x7c], "callQuant"),
    ];
    routes.extend(bridged.into_iter().map(|(selector, name)| {
        SwapRouteDescriptor::new(selector, name, with_fee_args("callData"))
            .with_amount(vec![I(1)])
            .with_inner_call(vec![I(3)])
    }));
    routes
}

/// Calls embedded in an entry route's `callData`.
pub fn builtin_wrapped_routes() -> Vec<SwapRouteDescriptor> {
    let swap_exact_in = SwapRouteDescriptor::new(
        [0x9a, 0xa9, 0x03, 0x56],
        "swapExactIn",
        vec![
            field("orderId", Shape::Uint),
            field(
                "request",
                Shape::Tuple(vec![
                    field("inputToken", Shape::Address),
                    field("outputToken", Shape::Address),
                    field("minOutputAmount", Shape::Uint),
                    field("deadline", Shape::Uint),
                ]),
            ),
            field("routesAmount", Shape::array(Shape::Uint)),
            field(
                "routes",
                Shape::array(Shape::array(Shape::Tuple(vec![
                    field("mixAdapters", Shape::array(Shape::Uint)),
                    field("assetTo", Shape::array(Shape::Address)),
                    field("rawData", Shape::array(Shape::Uint)),
                    field("extraData", Shape::array(Shape::Bytes)),
                    field("fromToken", Shape::Address),
                ]))),
            ),
            field("feeConfig", Shape::Uint),
        ],
    )
    .with_tokens(vec![I(1), F("inputToken")], vec![I(1), F("outputToken")]);

    let one_inch_swap = SwapRouteDescriptor::new(
        [0x07, 0xed, 0x23, 0x79],
        "swap",
        vec![
            field("executor", Shape::Address),
            field(
                "desc",
                Shape::Tuple(vec![
                    field("srcToken", Shape::Address),
                    field("dstToken", Shape::Address),
                    field("srcReceiver", Shape::Address),
                    field("dstReceiver", Shape::Address),
                    field("amount", Shape::Uint),
                    field("minReturnAmount", Shape::Uint),
                    field("flags", Shape::Uint),
                ]),
            ),
            field("data", Shape::Bytes),
        ],
    )
    .with_tokens(vec![I(1), F("srcToken")], vec![I(1), F("dstToken")]);

    let okx_smart_swap = SwapRouteDescriptor::new(
        [0xb8, 0x0c, 0x2f, 0x09],
        "smartSwapByOrderId",
        vec![
            field("orderId", Shape::Uint),
            field(
                "baseRequest",
                Shape::Tuple(vec![
                    // packed: flags in the high bytes, token in the low 20
                    field("fromToken", Shape::Uint),
                    field("toToken", Shape::Address),
                    field("fromTokenAmount", Shape::Uint),
                    field("minReturnAmount", Shape::Uint),
                    field("deadLine", Shape::Uint),
                ]),
            ),
            field("batchesAmount", Shape::array(Shape::Uint)),
            field(
                "batches",
                Shape::array(Shape::array(Shape::Tuple(vec![
                    field("mixAdapters", Shape::array(Shape::Address)),
                    field("assetTo", Shape::array(Shape::Address)),
                    field("rawData", Shape::array(Shape::Uint)),
                    field("extraData", Shape::array(Shape::Bytes)),
                    field("fromToken", Shape::Uint),
                ]))),
            ),
            field(
                "extraData",
                Shape::array(Shape::Tuple(vec![
                    field("pathIndex", Shape::Uint),
                    field("payer", Shape::Address),
                    field("fromToken", Shape::Address),
                    field("toToken", Shape::Address),
                    field("fromTokenAmountMax", Shape::Uint),
                    field("toTokenAmountMax", Shape::Uint),
                    field("salt", Shape::Uint),
                    field("deadLine", Shape::Uint),
                    field("isPushOrder", Shape::Bool),
                    field("extension", Shape::Bytes),
                ])),
            ),
        ],
    )
    .with_tokens(vec![I(1), F("fromToken")], vec![I(1), F("toToken")]);

    vec![swap_exact_in, one_inch_swap, okx_smart_swap]
}

pub(crate) static BUILTIN_ENTRY: Lazy<RouteRegistry> = Lazy::new(|| {
    RouteRegistry::from_routes(builtin_entry_routes()).unwrap_or_else(|e| {
        tracing::error!("❌ Built-in entry routes are inconsistent: {}", e);
        RouteRegistry::new()
    })
});

pub(crate) static BUILTIN_WRAPPED: Lazy<RouteRegistry> = Lazy::new(|| {
    RouteRegistry::from_routes(builtin_wrapped_routes()).unwrap_or_else(|e| {
        tracing::error!("❌ Built-in wrapped routes are inconsistent: {}", e);
        RouteRegistry::new()
    })
});
