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

//! Utilities for deserializing config values with intermediate shell-expansion.

use core::fmt::Display;
use core::marker::PhantomData;
use core::str::FromStr;
use core::time::Duration;

use byte_unit::Byte;
use serde::{Deserialize, Deserializer, de};
use serde_with::{DeserializeAs, DurationSeconds, Same, serde_as};

/// Invokes shell-expansion on string values before parsing them, and
/// deserializes everything else through `De`.
///
/// ```rust
/// # use serde::Deserialize;
/// # use serde_with::serde_as;
/// # use crilink_config::deser::ShellExpand;
/// #[serde_as]
/// #[derive(Deserialize)]
/// struct Endpoint {
///     #[serde_as(as = "ShellExpand")]
///     path: String,
/// }
///
/// // SAFETY: no other thread of this doctest touches the environment.
/// unsafe { std::env::set_var("CRI_SOCKET", "/run/containerd/containerd.sock") };
///
/// let Endpoint { path } = serde_json5::from_str(r#"{ path: "unix://$CRI_SOCKET" }"#).unwrap();
/// assert_eq!(path, "unix:///run/containerd/containerd.sock");
/// ```
///
/// The second type parameter picks the parser used on the expanded string.
/// [`ShellExpandBytes`] parses human-readable sizes (`"16MiB"`) and
/// [`ShellExpandDuration`] parses human-readable durations (`"1m 30s"`).
#[derive(Debug)]
pub struct ShellExpand<De = Same, Conv = Same>(PhantomData<(De, Conv)>);

pub trait ShellExpandable<T> {
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error>;
}

impl<'de, De, Conv, T> DeserializeAs<'de, T> for ShellExpand<De, Conv>
where
    De: DeserializeAs<'de, T>,
    Conv: ShellExpandable<T>,
{
    fn deserialize_as<D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
    {
        /// Catches strings in `String` and deserializes everything else via
        /// `A::deserialize_as::<B>()`.
        #[serde_as]
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOr<A, B> {
            /// Makes `StringOr` own an `A` for the type-checker.
            #[serde(skip)]
            _A(PhantomData<A>),

            String(String),

            Or(
                #[serde_as(as = "A")]
                #[serde(bound(deserialize = "A: DeserializeAs<'de, B>"))]
                B,
            ),
        }

        match StringOr::<De, T>::deserialize(deserializer)? {
            StringOr::_A(_) => unreachable!("serde skips deserializing this variant"),
            StringOr::String(s) => {
                let expanded = shellexpand::env(&s).map_err(de::Error::custom)?;
                Conv::convert::<D>(&expanded)
            }
            StringOr::Or(t) => Ok(t),
        }
    }
}

impl<T> ShellExpandable<T> for Same
where
    T: FromStr<Err: Display>,
{
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error> {
        T::from_str(s).map_err(de::Error::custom)
    }
}

impl<T> ShellExpandable<T> for Byte
where
    u128: TryInto<T, Error: Display>,
{
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<T, D::Error> {
        let byte_size = Byte::parse_str(s, true).map_err(de::Error::custom)?;
        byte_size.as_u128().try_into().map_err(de::Error::custom)
    }
}

/// Sizes given as integer bytes or as strings like `"16MiB"`.
pub type ShellExpandBytes<De = Same> = ShellExpand<De, Byte>;

impl ShellExpandable<Self> for Duration {
    fn convert<'de, D: Deserializer<'de>>(s: &str) -> Result<Self, D::Error> {
        humantime::parse_duration(s).map_err(de::Error::custom)
    }
}

/// Durations given as integer seconds or as strings like `"2m"`.
pub type ShellExpandDuration = ShellExpand<DurationSeconds<u64>, Duration>;
