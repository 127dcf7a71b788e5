// Copyright 2021 MaidSafe.net limited.
//
// This SAFE Network Software is licensed to you under The General Public License (GPL), version 3.
// Unless required by applicable law or agreed to in writing, the SAFE Network Software distributed
// under the GPL Licence is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied. Please review the Licences for the specific language governing
// permissions and limitations relating to use of the SAFE Network Software.

//! The stream capability set shared by every destination the engine writes into.

use std::{
    fs::File,
    io::{self, Cursor, Read, Seek, Write},
};

/// A readable, writable, seekable byte stream with a logical length that can be set directly.
///
/// `Read`, `Write` and `Seek` provide read, write, flush and seek; this trait adds the length
/// and position accessors. Decorators such as [`ProgressStream`](crate::ProgressStream) wrap
/// one `DataStream` and are themselves a `DataStream`.
pub trait DataStream: Read + Write + Seek {
    /// Logical length of the stream in bytes.
    fn len(&self) -> io::Result<u64>;

    /// Whether the logical length is zero.
    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Sets the logical length of the stream.
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// Current cursor position.
    fn position(&mut self) -> io::Result<u64> {
        self.stream_position()
    }
}

impl DataStream for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl DataStream for Cursor<Vec<u8>> {
    fn len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length exceeds usize"))?;
        self.get_mut().resize(len, 0);
        Ok(())
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(Cursor::position(self))
    }
}

impl<S: DataStream + ?Sized> DataStream for &mut S {
    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn position(&mut self) -> io::Result<u64> {
        (**self).position()
    }
}
