/*
 * Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
 * SPDX-License-Identifier: Apache-2.0
 */

use aws_sdk_s3::operation::list_objects_v2::ListObjectsV2Output;

use crate::error::{Error, ErrorKind};

/// Paginator for the `ListObjectsV2` operation over a whole bucket.
///
/// A failed page ends the listing with that error. A page that claims to be truncated but
/// carries no continuation token is reported as an error too, since the remaining keys could
/// not be fetched.
#[derive(Debug)]
pub(super) struct ListObjectsPaginator {
    client: aws_sdk_s3::Client,
    bucket: String,
    state: Option<State>,
}

#[derive(Debug, PartialEq)]
enum State {
    Paginating { next_token: Option<String> },
    Done,
}

impl State {
    fn next_state(self, output: &ListObjectsV2Output) -> Result<State, Error> {
        let is_truncated = output.is_truncated().unwrap_or(false);
        match (self, output.next_continuation_token()) {
            (State::Done, _) => Ok(State::Done),
            (State::Paginating { .. }, Some(token)) if is_truncated => Ok(State::Paginating {
                next_token: Some(token.to_owned()),
            }),
            (State::Paginating { .. }, None) if is_truncated => Err(Error::new(
                ErrorKind::Backend,
                "listing was truncated but no continuation token was returned",
            )),
            (State::Paginating { .. }, _) => Ok(State::Done),
        }
    }
}

impl ListObjectsPaginator {
    pub(super) fn new(client: aws_sdk_s3::Client, bucket: String) -> Self {
        Self {
            client,
            bucket,
            state: Some(State::Paginating { next_token: None }),
        }
    }

    pub(super) async fn next_page(&mut self) -> Option<Result<ListObjectsV2Output, Error>> {
        let next_token = match self.state.as_ref()? {
            State::Done => return None,
            State::Paginating { next_token } => next_token.clone(),
        };

        tracing::trace!(?next_token, "requesting page of objects");
        let result = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .set_continuation_token(next_token)
            .send()
            .await;

        // stop after the first failure, a half-read listing is never resumed
        let prev_state = self.state.take()?;
        let output = match result {
            Ok(output) => output,
            Err(err) => return Some(Err(err.into())),
        };
        match prev_state.next_state(&output) {
            Ok(next_state) => {
                self.state.replace(next_state);
                Some(Ok(output))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
