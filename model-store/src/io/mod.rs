/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

mod reader;
mod stream;

// re-exports
pub use self::reader::ModelReader;
pub use self::stream::InputStream;
