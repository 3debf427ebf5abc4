//! Service storage traits implemented on top of [`matrixon_db::Database`]

mod rooms;

use matrixon_db::Database;

use crate::service;

impl service::rooms::Data for Database {}
