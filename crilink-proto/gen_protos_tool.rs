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

use std::path::PathBuf;

use clap::Parser;
use prost_build::Config;

/// Regenerates the checked-in CRI bindings under `genproto/`.
#[derive(Parser, Debug)]
#[command(about = "Codegen grpc/protobuf bindings for the CRI image service")]
struct Args {
    /// Input proto files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output directory.
    #[arg(short = 'o', long = "output_dir")]
    output_dir: PathBuf,

    /// Proto include root.
    #[arg(short = 'I', long = "include", default_value = "crilink-proto/proto")]
    include: PathBuf,
}

fn main() -> std::io::Result<()> {
    let args = Args::parse();

    // The image service is consumed as a client; the server half is only
    // used to stand up fake backends in tests.
    tonic_build::configure()
        .build_client(true)
        .build_server(true)
        .out_dir(args.output_dir)
        .compile_protos_with_config(Config::new(), &args.inputs, &[args.include])
}
