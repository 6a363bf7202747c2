//! JVM entry points for `ColumnarReader`.
//!
//! The Java side keeps the returned `jlong` and hands it back on every
//! call; `free` is registered with a `Cleaner` so a reader the program
//! forgot to close is still released.

use jni::objects::{JByteArray, JClass, JString};
use jni::sys::jlong;
use jni::JNIEnv;

use crate::{BridgeError, ParquetFileReader, ReaderProperties, Result};

impl ParquetFileReader {
    fn from_jlong<'a>(value: jlong) -> Result<&'a Self> {
        unsafe { (value as *const ParquetFileReader).as_ref() }
            .ok_or_else(|| BridgeError::argument("null reader pointer"))
    }
}

fn throw(env: &mut JNIEnv, err: BridgeError) {
    log::debug!("jni: throwing {}", err);
    if let Err(jni_err) =
        env.throw_new("java/lang/RuntimeException", err.to_string())
    {
        log::warn!("jni: could not throw: {}", jni_err);
    }
}

fn into_jlong(env: &mut JNIEnv, reader: Result<ParquetFileReader>) -> jlong {
    match reader {
        Ok(reader) => Box::into_raw(Box::new(reader)) as jlong,
        Err(err) => {
            throw(env, err);
            0
        }
    }
}

#[no_mangle]
pub extern "system" fn Java_ColumnarReader_open<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass,
    path: JString<'local>,
) -> jlong {
    let reader = env
        .get_string(&path)
        .map_err(|e| BridgeError::argument(e.to_string()))
        .and_then(|path| ParquetFileReader::open(String::from(path)));
    into_jlong(&mut env, reader)
}

#[no_mangle]
pub extern "system" fn Java_ColumnarReader_openBytes<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass,
    data: JByteArray<'local>,
    read_ahead: jlong,
) -> jlong {
    let reader = env
        .convert_byte_array(&data)
        .map_err(|e| BridgeError::argument(e.to_string()))
        .and_then(|bytes| {
            let read_ahead = usize::try_from(read_ahead).map_err(|_| {
                BridgeError::argument("read-ahead must not be negative")
            })?;
            let properties =
                ReaderProperties::default().with_read_ahead(read_ahead);
            ParquetFileReader::from_bytes(bytes, &properties)
        });
    into_jlong(&mut env, reader)
}

#[no_mangle]
pub extern "system" fn Java_ColumnarReader_numRows<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass,
    reader_ptr: jlong,
) -> jlong {
    let rows = ParquetFileReader::from_jlong(reader_ptr)
        .and_then(|reader| reader.metadata())
        .and_then(|metadata| metadata.num_rows());
    rows.unwrap_or_else(|err| {
        throw(&mut env, err);
        -1
    })
}

#[no_mangle]
pub extern "system" fn Java_ColumnarReader_numRowGroups<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass,
    reader_ptr: jlong,
) -> jlong {
    let groups = ParquetFileReader::from_jlong(reader_ptr)
        .and_then(|reader| reader.metadata())
        .and_then(|metadata| metadata.num_row_groups())
        .map(|groups| groups as jlong);
    groups.unwrap_or_else(|err| {
        throw(&mut env, err);
        -1
    })
}

#[no_mangle]
pub extern "system" fn Java_ColumnarReader_close<'local>(
    mut env: JNIEnv<'local>,
    _class: JClass,
    reader_ptr: jlong,
) {
    if let Err(err) =
        ParquetFileReader::from_jlong(reader_ptr).and_then(|r| r.close())
    {
        throw(&mut env, err);
    }
}

/// Target of the JVM cleaner. A zero pointer is ignored.
#[no_mangle]
pub extern "system" fn Java_ColumnarReader_free<'local>(
    _env: JNIEnv<'local>,
    _class: JClass,
    reader_ptr: jlong,
) {
    if reader_ptr != 0 {
        let reader =
            unsafe { Box::from_raw(reader_ptr as *mut ParquetFileReader) };
        reader.dispose();
    }
}
