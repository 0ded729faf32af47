//! Tests for error types.

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::path::Path;

    #[test]
    fn test_error_display() {
        let err = Error::config("invalid extension");
        assert_eq!(err.to_string(), "configuration error: invalid extension");
    }

    #[test]
    fn test_error_internal() {
        let err = Error::internal("task join failed");
        assert_eq!(err.to_string(), "internal error: task join failed");
    }

    #[test]
    fn test_watcher_error_conversion() {
        let watch_err = WatcherError::unwatchable(Path::new("/tmp/missing"), "not found");
        let err: Error = watch_err.into();
        assert!(matches!(err, Error::Watcher(_)));
        assert_eq!(
            err.to_string(),
            "watcher error: cannot watch directory '/tmp/missing': not found"
        );
    }

    #[test]
    fn test_annotation_error_conversion() {
        let ann_err = AnnotationError::Init("model not found".to_string());
        let err: Error = ann_err.into();
        assert!(matches!(err, Error::Annotation(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_source_closed_display() {
        assert_eq!(WatcherError::SourceClosed.to_string(), "event source closed");
        assert_eq!(
            WatcherError::DirectoryLost {
                path: "/inbox".to_string()
            }
            .to_string(),
            "watch directory '/inbox' is gone"
        );
    }

    #[test]
    fn test_read_and_write_errors() {
        let read = WatcherError::Read {
            path: "/in/a.txt".to_string(),
            reason: "no such file".to_string(),
        };
        assert_eq!(read.to_string(), "failed to read '/in/a.txt': no such file");

        let write = WatcherError::Write {
            path: "/in/a.txt.xml".to_string(),
            reason: "permission denied".to_string(),
        };
        assert_eq!(
            write.to_string(),
            "failed to write '/in/a.txt.xml': permission denied"
        );
    }

    #[test]
    fn test_annotation_process_display() {
        let err = AnnotationError::Process("tagger crashed".to_string());
        assert_eq!(err.to_string(), "annotation failed: tagger crashed");
    }

    #[test]
    fn test_error_debug_format() {
        let err = Error::Internal("something went wrong".to_string());
        let debug_str = format!("{err:?}");
        assert!(debug_str.contains("Internal"));
        assert!(debug_str.contains("something went wrong"));
    }

    #[test]
    fn test_error_propagation_with_question_mark() {
        fn inner() -> Result<i32> {
            Err(WatcherError::SourceClosed.into())
        }

        fn outer() -> Result<i32> {
            let _ = inner()?;
            Ok(0)
        }

        let result = outer();
        assert_eq!(
            result.unwrap_err().to_string(),
            "watcher error: event source closed"
        );
    }
}
