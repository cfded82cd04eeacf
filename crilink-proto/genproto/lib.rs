// Copyright 2025 The NativeLink Authors. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// *** DO NOT MODIFY ***
// This file is auto-generated. To update it, run:
// `cargo run -p crilink-proto --features codegen-tool -- \
//     crilink-proto/proto/runtime/v1/api.proto -o crilink-proto/genproto`

#![allow(clippy::default_trait_access, clippy::doc_markdown)]

pub mod runtime {
    pub mod v1 {
        include!("runtime.v1.pb.rs");
    }
}
