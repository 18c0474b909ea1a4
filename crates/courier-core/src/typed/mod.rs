//! Typed - 型付き Action API
//!
//! このモジュールは payload の判別子の typo を型で排除し、
//! Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Action` trait, `Handler<A>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure

pub mod action;
pub mod codec;
pub mod handler;
pub mod registry;

// 主要な trait/型 を再エクスポート
pub use self::action::Action;
pub use self::codec::{CodecError, PayloadCodec};
pub use self::handler::{DynHandler, Handler, HandlerError, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
