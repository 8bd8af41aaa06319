//! Protocol messages and gRPC stubs generated from `proto/provider.proto`.

#![allow(missing_docs)]
#![allow(clippy::all)]

tonic::include_proto!("skytap.provider.v1");
